//! Index Module
//!
//! In-memory key -> on-disk position map. The index holds no values; it is
//! rebuilt from the data files on every open.
//!
//! ## Responsibilities
//! - Point lookups for reads and merge liveness checks
//! - Ordered iteration (byte-wise key order) for listing, fold and iterators
//! - Internal synchronization, so lookups are safe without the engine lock
//!
//! ## Implementations
//! - [`BTree`]: `BTreeMap` under a `RwLock`
//! - [`SkipList`]: lock-free `crossbeam_skiplist::SkipMap`
//!
//! New structures are added by implementing [`Indexer`] and registering
//! them in [`new_indexer`]; the engine only sees the trait.

mod btree;
mod iterator;
mod skiplist;

pub use btree::BTree;
pub use iterator::SnapshotIterator;
pub use skiplist::SkipList;

use crate::config::IndexType;
use crate::data::LogRecordPos;

/// Capability set every index implementation provides
pub trait Indexer: Send + Sync {
    /// Insert or overwrite; `false` signals an internal failure
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool;

    /// Position of `key`, if indexed
    fn get(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Remove `key`; `false` if it was not present
    fn delete(&self, key: &[u8]) -> bool;

    /// Number of indexed keys
    fn size(&self) -> usize;

    /// Snapshot iterator in ascending (or descending) key order
    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator>;
}

/// Cursor over index entries
pub trait IndexIterator: Send {
    /// Back to the first entry
    fn rewind(&mut self);

    /// Position at the first key >= `key` (<= `key` when reversed)
    fn seek(&mut self, key: &[u8]);

    /// Advance one entry
    fn next(&mut self);

    /// Whether the cursor points at an entry
    fn valid(&self) -> bool;

    /// Current key (`None` once exhausted)
    fn key(&self) -> Option<&[u8]>;

    /// Current position (`None` once exhausted)
    fn value(&self) -> Option<LogRecordPos>;

    /// Release resources held by the iterator
    fn close(&mut self);
}

/// Build the index implementation selected by `index_type`
pub fn new_indexer(index_type: IndexType) -> Box<dyn Indexer> {
    match index_type {
        IndexType::BTree => Box::new(BTree::new()),
        IndexType::SkipList => Box::new(SkipList::new()),
    }
}
