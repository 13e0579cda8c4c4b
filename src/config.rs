//! Configuration for CaskKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CaskError, Result};

/// Main configuration for a CaskKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the data files
    /// Internal structure:
    ///   {dir_path}/
    ///     ├── 000000000.data   (older data files, read-only)
    ///     ├── 000000001.data   (active data file)
    ///     ├── hint-index       (written by merge, optional)
    ///     └── merge-finished   (written by merge, optional)
    pub dir_path: PathBuf,

    /// Size threshold (bytes) at which the active file is rotated
    pub data_file_size: u64,

    /// fsync after every write
    pub sync_writes: bool,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// In-memory index implementation
    pub index_type: IndexType,
}

/// Available in-memory index implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// Ordered B-tree (`BTreeMap` under a read-write lock)
    #[default]
    BTree,

    /// Lock-free skiplist
    SkipList,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir_path: std::env::temp_dir().join("caskkv"),
            data_file_size: 256 * 1024 * 1024, // 256 MB
            sync_writes: false,
            index_type: IndexType::BTree,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.dir_path.as_os_str().is_empty() {
            return Err(CaskError::Config("database dir path is empty".to_string()));
        }
        if self.data_file_size == 0 {
            return Err(CaskError::Config(
                "database data file size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn dir_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dir_path = path.into();
        self
    }

    /// Set the per-file size threshold (in bytes)
    pub fn data_file_size(mut self, size: u64) -> Self {
        self.config.data_file_size = size;
        self
    }

    /// Enable or disable fsync on every write
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the index implementation
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.config.index_type = index_type;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Options for [`Engine::iter`](crate::Engine::iter)
#[derive(Debug, Clone, Default)]
pub struct IteratorOptions {
    /// Only yield keys starting with this prefix (empty = all keys)
    pub prefix: Vec<u8>,

    /// Traverse in descending key order
    pub reverse: bool,
}

/// Options for [`WriteBatch`](crate::WriteBatch)
#[derive(Debug, Clone, Copy)]
pub struct WriteBatchOptions {
    /// Maximum number of staged writes in one batch
    pub max_batch_num: usize,

    /// fsync the active file when the batch commits
    pub sync_writes: bool,
}

impl Default for WriteBatchOptions {
    fn default() -> Self {
        Self {
            max_batch_num: 500_000,
            sync_writes: true,
        }
    }
}
