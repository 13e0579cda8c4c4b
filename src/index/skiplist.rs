//! Skiplist index
//!
//! Lock-free ordered map; reads and writes never block each other.

use crossbeam_skiplist::SkipMap;

use crate::data::LogRecordPos;

use super::{IndexIterator, Indexer, SnapshotIterator};

/// Ordered skiplist index
pub struct SkipList {
    map: SkipMap<Vec<u8>, LogRecordPos>,
}

impl SkipList {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
        }
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for SkipList {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool {
        self.map.insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.map.get(key).map(|entry| *entry.value())
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn iterator(&self, reverse: bool) -> Box<dyn IndexIterator> {
        let items = self
            .map
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        Box::new(SnapshotIterator::new(items, reverse))
    }
}
