//! # CaskKV
//!
//! An embedded, single-process key-value storage engine on the bitcask model:
//! - Values are appended to immutable log files
//! - A fully in-memory index maps each key to its latest on-disk position
//! - Crash recovery rebuilds the index by replaying the log
//! - Atomic write batches via sequence-numbered records
//! - Merge reclaims space and emits a hint file for fast startup
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │      put / delete / get / fold / iter / WriteBatch          │
//! └───────────────┬──────────────────────────────┬──────────────┘
//!                 │ append                       │ lookup
//!                 ▼                              ▼
//!   ┌───────────────────────────┐      ┌───────────────────┐
//!   │  Data Files               │      │      Index        │
//!   │  (1 active + N older)     │◄─────┤  key -> (fid,off) │
//!   └─────────────┬─────────────┘      └───────────────────┘
//!                 │ merge
//!                 ▼
//!   ┌───────────────────────────┐
//!   │  {dir}-merge/             │
//!   │  data + hint + finished   │
//!   └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use caskkv::{Config, Engine};
//!
//! let engine = Engine::open(Config::builder().dir_path("/tmp/caskkv").build()).unwrap();
//! engine.put(b"name", b"bitcask").unwrap();
//! assert_eq!(engine.get(b"name").unwrap(), b"bitcask".to_vec());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod batch;
pub mod data;
pub mod engine;
pub mod fio;
pub mod index;
pub mod iterator;
pub mod merge;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::WriteBatch;
pub use config::{Config, IndexType, IteratorOptions, WriteBatchOptions};
pub use engine::Engine;
pub use error::{CaskError, Result};
pub use iterator::DbIterator;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CaskKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
