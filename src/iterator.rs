//! Engine iterator
//!
//! Ordered traversal over the index with an optional key prefix and
//! direction. Values are resolved from the data files on demand, never
//! cached.

use crate::config::IteratorOptions;
use crate::engine::Engine;
use crate::error::{CaskError, Result};
use crate::index::IndexIterator;

/// Cursor over live keys, in key order
pub struct DbIterator<'a> {
    index_iter: Box<dyn IndexIterator>,
    engine: &'a Engine,
    options: IteratorOptions,
}

impl Engine {
    /// Create an iterator positioned at the first matching key
    pub fn iter(&self, options: IteratorOptions) -> DbIterator<'_> {
        let index_iter = self.index.iterator(options.reverse);
        let mut iter = DbIterator {
            index_iter,
            engine: self,
            options,
        };
        iter.rewind();
        iter
    }
}

impl DbIterator<'_> {
    /// Back to the first matching key
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_next();
    }

    /// First matching key >= `key` (<= `key` when reversed)
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_next();
    }

    /// Advance to the next matching key
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_next();
    }

    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// Current key (`None` once exhausted)
    pub fn key(&self) -> Option<&[u8]> {
        self.index_iter.key()
    }

    /// Read the current value from disk
    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.index_iter.value().ok_or(CaskError::KeyNotFound)?;
        let state = self.engine.state.read();
        Engine::value_at(&state, &pos)
    }

    /// Release the underlying index iterator
    pub fn close(mut self) {
        self.index_iter.close();
    }

    fn skip_to_next(&mut self) {
        if self.options.prefix.is_empty() {
            return;
        }
        while let Some(key) = self.index_iter.key() {
            if key.starts_with(&self.options.prefix) {
                break;
            }
            self.index_iter.next();
        }
    }
}
