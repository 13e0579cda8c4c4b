//! Write Batch
//!
//! Atomic multi-key writes on top of the append path.
//!
//! ## Key Encoding
//! Every stored key is prefixed with the batch sequence number:
//! ```text
//! ┌───────────────────┬───────────────┐
//! │ seq_no (uvarint)  │   real key    │
//! └───────────────────┴───────────────┘
//! ```
//! `seq_no = 0` marks a plain (non-batch) write.
//!
//! ## Commit Protocol
//! 1. Take the engine write lock and allocate the next sequence number
//! 2. Append every staged record under that sequence number
//! 3. Append one `TxnFinished` record carrying the same sequence number
//! 4. Apply the staged records to the index
//!
//! Recovery only applies a batch's records once it has seen step 3, so a
//! crash before the marker leaves the whole batch invisible.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;

use crate::config::WriteBatchOptions;
use crate::data::{decode_uvarint, encode_uvarint, LogRecord, LogRecordPos, LogRecordType};
use crate::engine::Engine;
use crate::error::{CaskError, Result};

/// Sequence number of writes that are not part of a batch
pub const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// Key of the record that terminates a committed batch
pub const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Prefix `key` with `seq_no`
pub fn encode_key_with_seq(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(10 + key.len());
    encode_uvarint(seq_no, &mut buf);
    buf.put_slice(key);
    buf.to_vec()
}

/// Split a stored key into (real key, seq_no)
pub fn parse_key_with_seq(key: &[u8]) -> Option<(Vec<u8>, u64)> {
    let (seq_no, n) = decode_uvarint(key)?;
    Some((key[n..].to_vec(), seq_no))
}

/// Staged writes that commit atomically
///
/// Dropping a batch without calling [`commit`](WriteBatch::commit)
/// discards it.
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    options: WriteBatchOptions,
    /// Last staged write per key
    pending_writes: Mutex<HashMap<Vec<u8>, LogRecord>>,
}

impl Engine {
    /// Start a new write batch
    pub fn new_write_batch(&self, options: WriteBatchOptions) -> WriteBatch<'_> {
        WriteBatch {
            engine: self,
            options,
            pending_writes: Mutex::new(HashMap::new()),
        }
    }
}

impl WriteBatch<'_> {
    /// Stage a put
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let record = LogRecord::normal(key.to_vec(), value.to_vec());
        self.pending_writes.lock().insert(key.to_vec(), record);
        Ok(())
    }

    /// Stage a delete
    ///
    /// Replaces any staged put for the key. Whether a tombstone is written
    /// is decided at commit, against the index as it is then.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let record = LogRecord::deleted(key.to_vec());
        self.pending_writes.lock().insert(key.to_vec(), record);
        Ok(())
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.pending_writes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_writes.lock().is_empty()
    }

    /// Write all staged records plus a finish marker, then update the index
    ///
    /// A staged delete of a key that is not indexed at commit time writes
    /// nothing. If nothing is left to write, no sequence number is used.
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending_writes.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.options.max_batch_num {
            return Err(CaskError::ExceedMaxBatchNum(self.options.max_batch_num));
        }

        let mut state = self.engine.state.write();

        let records: Vec<&LogRecord> = pending
            .values()
            .filter(|record| {
                record.rec_type != LogRecordType::Deleted
                    || self.engine.index.get(&record.key).is_some()
            })
            .collect();
        if records.is_empty() {
            drop(records);
            pending.clear();
            return Ok(());
        }

        state.seq_no += 1;
        let seq_no = state.seq_no;

        let mut positions: HashMap<Vec<u8>, LogRecordPos> = HashMap::with_capacity(records.len());
        for record in records {
            let stored = LogRecord {
                key: encode_key_with_seq(&record.key, seq_no),
                value: record.value.clone(),
                rec_type: record.rec_type,
            };
            let pos = self.engine.append_log_record(&mut state, &stored)?;
            positions.insert(record.key.clone(), pos);
        }

        let finished = LogRecord {
            key: encode_key_with_seq(TXN_FIN_KEY, seq_no),
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        };
        self.engine.append_log_record(&mut state, &finished)?;

        if self.options.sync_writes {
            if let Some(active) = &state.active_file {
                active.sync()?;
            }
        }

        for (key, record) in pending.drain() {
            match (record.rec_type, positions.get(&key)) {
                (LogRecordType::Normal, Some(&pos)) => {
                    if !self.engine.index.put(key, pos) {
                        return Err(CaskError::IndexUpdateFailed);
                    }
                }
                (LogRecordType::Deleted, Some(_)) => {
                    self.engine.index.delete(&key);
                }
                _ => {}
            }
        }

        tracing::debug!(seq_no, "committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_with_seq_round_trip() {
        let encoded = encode_key_with_seq(b"user:1", 300);
        assert_eq!(encoded.len(), 2 + 6);
        assert_eq!(parse_key_with_seq(&encoded), Some((b"user:1".to_vec(), 300)));
    }

    #[test]
    fn test_non_transactional_prefix_is_one_byte() {
        let encoded = encode_key_with_seq(b"k", NON_TRANSACTION_SEQ_NO);
        assert_eq!(encoded, vec![0, b'k']);
    }

    #[test]
    fn test_parse_rejects_truncated_prefix() {
        assert_eq!(parse_key_with_seq(&[0x80]), None);
    }
}
