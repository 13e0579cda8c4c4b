//! Snapshot index iterator
//!
//! Copies (key, position) pairs out of the index at construction time, so
//! later index mutations never affect an open iterator.

use crate::data::LogRecordPos;

use super::IndexIterator;

/// Iterator over a point-in-time copy of the index
pub struct SnapshotIterator {
    /// Entries in iteration order (descending when reversed)
    items: Vec<(Vec<u8>, LogRecordPos)>,
    cursor: usize,
    reverse: bool,
}

impl SnapshotIterator {
    /// `items` must be sorted ascending by key
    pub fn new(mut items: Vec<(Vec<u8>, LogRecordPos)>, reverse: bool) -> Self {
        if reverse {
            items.reverse();
        }
        Self {
            items,
            cursor: 0,
            reverse,
        }
    }
}

impl IndexIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.cursor = if self.reverse {
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        if self.cursor < self.items.len() {
            self.cursor += 1;
        }
    }

    fn valid(&self) -> bool {
        self.cursor < self.items.len()
    }

    fn key(&self) -> Option<&[u8]> {
        self.items.get(self.cursor).map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<LogRecordPos> {
        self.items.get(self.cursor).map(|(_, pos)| *pos)
    }

    fn close(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }
}
