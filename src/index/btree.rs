//! B-tree index
//!
//! `BTreeMap` keyed by raw key bytes, wrapped in a RwLock.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::data::LogRecordPos;

use super::{IndexIterator, Indexer, SnapshotIterator};

/// Ordered B-tree index
///
/// ## Concurrency:
/// - Lookups share a read lock; put/delete take the write lock
pub struct BTree {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTree {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTree {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool {
        self.tree.write().insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.tree.write().remove(key).is_some()
    }

    fn size(&self) -> usize {
        self.tree.read().len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let items = self
            .tree
            .read()
            .iter()
            .map(|(k, pos)| (k.clone(), *pos))
            .collect();
        Box::new(SnapshotIterator::new(items, reverse))
    }
}
