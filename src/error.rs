//! Error types for CaskKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for CaskKV operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("key not found in database")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Corruption / Invariant Errors
    // -------------------------------------------------------------------------
    #[error("data file {0} not found")]
    DataFileNotFound(u32),

    #[error("invalid crc for record at file {file_id}, offset {offset}")]
    InvalidCrc { file_id: u32, offset: u64 },

    #[error("corrupted log record: {0}")]
    CorruptedRecord(String),

    #[error("failed to update index")]
    IndexUpdateFailed,

    #[error("the data directory may be corrupted: {0}")]
    DataDirectoryCorrupted(String),

    // -------------------------------------------------------------------------
    // Concurrency-State Errors
    // -------------------------------------------------------------------------
    #[error("merge in progress, try again later")]
    MergeInProgress,

    #[error("exceeded max batch num ({0})")]
    ExceedMaxBatchNum(usize),
}
