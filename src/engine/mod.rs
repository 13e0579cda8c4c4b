//! Engine Module
//!
//! The core storage engine that coordinates data files and the index.
//!
//! ## Responsibilities
//! - Route writes through the shared append path, then update the index
//! - Resolve reads: index lookup -> data file read -> record decode
//! - Rotate the active file when it reaches the size threshold
//! - Rebuild the index on startup (see [`recovery`])

mod recovery;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::batch::{encode_key_with_seq, NON_TRANSACTION_SEQ_NO};
use crate::config::Config;
use crate::data::{DataFile, LogRecord, LogRecordPos, LogRecordType};
use crate::error::{CaskError, Result};
use crate::index::{new_indexer, Indexer};

/// Engine metadata guarded by a single lock
#[derive(Default)]
pub(crate) struct EngineState {
    /// The only file accepting appends (created lazily on first write)
    pub(crate) active_file: Option<Arc<DataFile>>,

    /// Sealed, read-only files by id
    pub(crate) older_files: HashMap<u32, Arc<DataFile>>,

    /// Last batch sequence number handed out
    pub(crate) seq_no: u64,

    /// Rejects a second concurrent merge
    pub(crate) is_merging: bool,
}

impl EngineState {
    /// Look up the active or an older file by id
    pub(crate) fn data_file(&self, file_id: u32) -> Option<&Arc<DataFile>> {
        match &self.active_file {
            Some(active) if active.file_id() == file_id => Some(active),
            _ => self.older_files.get(&file_id),
        }
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete/batch commit/rotation): exclusive `state` lock
///   for the whole append path, including the index update
/// - **Reads** (get/fold/iterator values): shared `state` lock
/// - **Index**: internally synchronized, so merge can check liveness
///   without holding `state`
pub struct Engine {
    /// Engine configuration
    pub(crate) config: Config,

    /// Active/older files, sequence number, merge flag
    pub(crate) state: RwLock<EngineState>,

    /// Key -> position map
    pub(crate) index: Box<dyn Indexer>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config and create the data directory
    /// 2. Install a completed merge, if one is waiting
    /// 3. Open data files (highest id becomes active)
    /// 4. Load the hint file, then replay the remaining data files
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.dir_path)?;
        let dir = config.dir_path.as_path();

        // Step 2: Swap in merged files from a finished merge
        recovery::install_merge_files(dir)?;

        // Step 3: Open data files in ascending id order
        let file_ids = recovery::discover_file_ids(dir)?;
        let mut state = EngineState::default();
        for (i, &file_id) in file_ids.iter().enumerate() {
            let data_file = Arc::new(DataFile::open(dir, file_id)?);
            if i == file_ids.len() - 1 {
                state.active_file = Some(data_file);
            } else {
                state.older_files.insert(file_id, data_file);
            }
        }

        // Step 4: Rebuild the index
        let index = new_indexer(config.index_type);
        let non_merge_file_id = recovery::read_non_merge_file_id(dir)?.unwrap_or(0);
        let hinted = recovery::load_index_from_hint_file(dir, index.as_ref())?;
        state.seq_no = recovery::load_index_from_data_files(
            &mut state,
            &file_ids,
            non_merge_file_id,
            index.as_ref(),
        )?;

        tracing::info!(
            dir = %dir.display(),
            files = file_ids.len(),
            hinted,
            keys = index.size(),
            seq_no = state.seq_no,
            "engine opened"
        );

        Ok(Self {
            config,
            state: RwLock::new(state),
            index,
        })
    }

    /// Get a value by key
    ///
    /// Returns `KeyNotFound` if the key is not indexed or resolves to a
    /// tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let state = self.state.read();
        let pos = self.index.get(key).ok_or(CaskError::KeyNotFound)?;
        Self::value_at(&state, &pos)
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append a Normal record (rotating the active file if needed)
    /// 3. Point the index at the new record
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let record = LogRecord::normal(
            encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO),
            value.to_vec(),
        );

        let mut state = self.state.write();
        let pos = self.append_log_record(&mut state, &record)?;

        // The record is already on disk; replay fixes the index on restart
        if !self.index.put(key.to_vec(), pos) {
            return Err(CaskError::IndexUpdateFailed);
        }

        Ok(())
    }

    /// Delete a key
    ///
    /// No-op if the key is not indexed. Otherwise appends a tombstone and
    /// removes the key from the index.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let mut state = self.state.write();
        if self.index.get(key).is_none() {
            return Ok(());
        }

        let record = LogRecord::deleted(encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO));
        self.append_log_record(&mut state, &record)?;

        if !self.index.delete(key) {
            return Err(CaskError::IndexUpdateFailed);
        }

        Ok(())
    }

    /// All live keys in ascending order
    pub fn list_keys(&self) -> Vec<Vec<u8>> {
        let mut iter = self.index.iterator(false);
        let mut keys = Vec::with_capacity(self.index.size());
        iter.rewind();
        while let Some(key) = iter.key() {
            keys.push(key.to_vec());
            iter.next();
        }
        iter.close();
        keys
    }

    /// Visit every live key/value pair in ascending key order
    ///
    /// Stops early when `f` returns `false`. Keys come from a snapshot of
    /// the index, and no lock is held while `f` runs, so `f` may write to
    /// this engine.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = self.index.iterator(false);
        iter.rewind();
        while let (Some(key), Some(pos)) = (iter.key(), iter.value()) {
            let value = {
                let state = self.state.read();
                Self::value_at(&state, &pos)?
            };
            if !f(key, &value) {
                break;
            }
            iter.next();
        }
        iter.close();
        Ok(())
    }

    /// Flush the active file to durable storage
    pub fn sync(&self) -> Result<()> {
        let state = self.state.read();
        if let Some(active) = &state.active_file {
            active.sync()?;
        }
        Ok(())
    }

    /// Flush every open data file to durable storage
    ///
    /// File handles are released when the engine is dropped.
    pub fn close(&self) -> Result<()> {
        let state = self.state.read();
        if let Some(active) = &state.active_file {
            active.sync()?;
        }
        for file in state.older_files.values() {
            file.sync()?;
        }
        Ok(())
    }

    // =========================================================================
    // Append Path
    // =========================================================================

    /// Append a record to the active file (caller holds the write lock)
    ///
    /// Rotates to a new active file first if the record would push the
    /// current one past `data_file_size`.
    pub(crate) fn append_log_record(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> Result<LogRecordPos> {
        let encoded = record.encode();
        let size = encoded.len() as u64;

        let mut active = match &state.active_file {
            Some(active) => Arc::clone(active),
            None => self.rotate_active_file(state)?,
        };

        // An empty file always takes the record, however large
        if active.write_off() > 0 && active.write_off() + size > self.config.data_file_size {
            active = self.rotate_active_file(state)?;
        }

        let write_off = active.write_off();
        active.write(&encoded)?;

        if self.config.sync_writes {
            active.sync()?;
        }

        Ok(LogRecordPos {
            file_id: active.file_id(),
            offset: write_off,
        })
    }

    /// Seal the active file and open its successor (caller holds the write lock)
    pub(crate) fn rotate_active_file(&self, state: &mut EngineState) -> Result<Arc<DataFile>> {
        let next_id = match state.active_file.take() {
            Some(active) => {
                active.sync()?;
                let file_id = active.file_id();
                state.older_files.insert(file_id, active);
                file_id + 1
            }
            None => 0,
        };

        let data_file = Arc::new(DataFile::open(&self.config.dir_path, next_id)?);
        state.active_file = Some(Arc::clone(&data_file));

        tracing::debug!(file_id = next_id, "opened new active data file");

        Ok(data_file)
    }

    /// Read the value a position points at (caller holds a read lock)
    pub(crate) fn value_at(state: &EngineState, pos: &LogRecordPos) -> Result<Vec<u8>> {
        let data_file = state
            .data_file(pos.file_id)
            .ok_or(CaskError::DataFileNotFound(pos.file_id))?;

        let (record, _) = data_file.read_log_record(pos.offset)?.ok_or_else(|| {
            CaskError::CorruptedRecord(format!(
                "no record at file {} offset {}",
                pos.file_id, pos.offset
            ))
        })?;

        if record.rec_type == LogRecordType::Deleted {
            return Err(CaskError::KeyNotFound);
        }

        Ok(record.value)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn dir_path(&self) -> &Path {
        &self.config.dir_path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of live keys in the index
    pub fn key_count(&self) -> usize {
        self.index.size()
    }

    /// Id of the active file, if any write has happened
    pub fn active_file_id(&self) -> Option<u32> {
        self.state.read().active_file.as_ref().map(|f| f.file_id())
    }

    /// Number of sealed data files
    pub fn older_file_count(&self) -> usize {
        self.state.read().older_files.len()
    }

    /// Last batch sequence number handed out
    pub fn seq_no(&self) -> u64 {
        self.state.read().seq_no
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Engine")
            .field("dir_path", &self.config.dir_path)
            .field("data_file_size", &self.config.data_file_size)
            .field("sync_writes", &self.config.sync_writes)
            .field("active_file", &state.active_file.as_ref().map(|f| f.file_id()))
            .field("older_files", &state.older_files.len())
            .field("keys", &self.index.size())
            .field("seq_no", &state.seq_no)
            .finish()
    }
}
