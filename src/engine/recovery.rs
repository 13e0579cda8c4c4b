//! Startup recovery
//!
//! Cold-start path: install a finished merge, discover data files, load
//! the hint file and replay the data files into the index.
//!
//! Replay applies non-transactional records immediately. Records written
//! by a batch are buffered per sequence number and applied only when that
//! batch's `TxnFinished` record is seen; anything still buffered at the end
//! belongs to a batch that never committed and is dropped.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::batch::{parse_key_with_seq, NON_TRANSACTION_SEQ_NO};
use crate::data::{
    DataFile, LogRecord, LogRecordPos, LogRecordType, DATA_FILE_NAME_SUFFIX, HINT_FILE_NAME,
    MERGE_FINISHED_FILE_NAME,
};
use crate::error::{CaskError, Result};
use crate::index::Indexer;
use crate::merge::merge_path;

use super::EngineState;

/// A batch record waiting for its `TxnFinished` marker
struct TransactionRecord {
    record: LogRecord,
    pos: LogRecordPos,
}

/// Ids of all data files in `dir`, ascending
///
/// A `.data` file whose stem is not an id means the directory is corrupted.
pub(super) fn discover_file_ids(dir: &Path) -> Result<Vec<u32>> {
    let mut file_ids = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if let Some(stem) = name.strip_suffix(DATA_FILE_NAME_SUFFIX) {
            let file_id = stem
                .parse::<u32>()
                .map_err(|_| CaskError::DataDirectoryCorrupted(name.to_string()))?;
            file_ids.push(file_id);
        }
    }

    file_ids.sort_unstable();
    Ok(file_ids)
}

/// Boundary recorded by a finished merge in `dir`, if any
pub(super) fn read_non_merge_file_id(dir: &Path) -> Result<Option<u32>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).is_file() {
        return Ok(None);
    }

    let file = DataFile::open_merge_finished_file(dir)?;
    let (record, _) = file.read_log_record(0)?.ok_or_else(|| {
        CaskError::CorruptedRecord("empty merge-finished file".to_string())
    })?;

    let file_id = std::str::from_utf8(&record.value)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| CaskError::CorruptedRecord("invalid merge boundary".to_string()))?;

    Ok(Some(file_id))
}

/// Replace merged-away data files with the output of a finished merge
///
/// The merge-finished marker stays in the merge directory until every
/// other file has been moved, so a crash at any step leaves an install
/// that the next open resumes:
/// 1. Drop the old hint/marker and every data file below the boundary
///    (skipped once the hint file has left the merge directory)
/// 2. Move the hint file, then the merged data files
/// 3. Move the marker, then remove the merge directory
///
/// A merge directory without a marker is discarded.
pub(super) fn install_merge_files(dir: &Path) -> Result<()> {
    let merge_dir = merge_path(dir);
    if !merge_dir.is_dir() {
        return Ok(());
    }

    let non_merge_file_id = match read_non_merge_file_id(&merge_dir)? {
        Some(file_id) => file_id,
        None => {
            tracing::warn!(dir = %merge_dir.display(), "discarding unfinished merge");
            fs::remove_dir_all(&merge_dir)?;
            return Ok(());
        }
    };

    // Step 1: only safe while no merged file has been moved in yet
    if merge_dir.join(HINT_FILE_NAME).is_file() {
        for name in [HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME] {
            remove_if_exists(&dir.join(name))?;
        }
        for file_id in discover_file_ids(dir)? {
            if file_id < non_merge_file_id {
                fs::remove_file(DataFile::file_path(dir, file_id))?;
            }
        }
        sync_dir(dir)?;

        fs::rename(merge_dir.join(HINT_FILE_NAME), dir.join(HINT_FILE_NAME))?;
    } else {
        tracing::warn!(non_merge_file_id, "resuming interrupted merge install");
    }

    // Step 2
    for file_id in discover_file_ids(&merge_dir)? {
        fs::rename(
            DataFile::file_path(&merge_dir, file_id),
            DataFile::file_path(dir, file_id),
        )?;
    }
    sync_dir(dir)?;

    // Step 3: the install is complete once the marker lands
    fs::rename(
        merge_dir.join(MERGE_FINISHED_FILE_NAME),
        dir.join(MERGE_FINISHED_FILE_NAME),
    )?;
    sync_dir(dir)?;
    fs::remove_dir_all(&merge_dir)?;

    tracing::info!(non_merge_file_id, "installed merged data files");
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Persist renames and unlinks in `dir`
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Seed the index from the hint file, returning the number of entries
pub(super) fn load_index_from_hint_file(dir: &Path, index: &dyn Indexer) -> Result<usize> {
    if !dir.join(HINT_FILE_NAME).is_file() {
        return Ok(0);
    }

    let hint_file = DataFile::open_hint_file(dir)?;
    let mut offset = 0;
    let mut loaded = 0;

    while let Some((record, size)) = hint_file.read_log_record(offset)? {
        let pos = LogRecordPos::decode(&record.value)
            .ok_or_else(|| CaskError::CorruptedRecord("invalid hint entry".to_string()))?;
        if !index.put(record.key, pos) {
            return Err(CaskError::IndexUpdateFailed);
        }
        loaded += 1;
        offset += size;
    }

    tracing::debug!(entries = loaded, "loaded hint file");
    Ok(loaded)
}

/// Replay data files with id >= `non_merge_file_id` into the index
///
/// Returns the highest sequence number seen, committed or not.
pub(super) fn load_index_from_data_files(
    state: &mut EngineState,
    file_ids: &[u32],
    non_merge_file_id: u32,
    index: &dyn Indexer,
) -> Result<u64> {
    let mut pending: HashMap<u64, Vec<TransactionRecord>> = HashMap::new();
    let mut current_seq_no = NON_TRANSACTION_SEQ_NO;

    for (i, &file_id) in file_ids.iter().enumerate() {
        // Already covered by the hint file
        if file_id < non_merge_file_id {
            continue;
        }

        let data_file = state
            .data_file(file_id)
            .map(Arc::clone)
            .ok_or(CaskError::DataFileNotFound(file_id))?;

        let mut offset = 0;
        while let Some((mut record, size)) = data_file.read_log_record(offset)? {
            let pos = LogRecordPos { file_id, offset };
            let (real_key, seq_no) = parse_key_with_seq(&record.key).ok_or_else(|| {
                CaskError::CorruptedRecord(format!(
                    "bad key encoding at file {} offset {}",
                    file_id, offset
                ))
            })?;

            if seq_no == NON_TRANSACTION_SEQ_NO {
                update_index(index, real_key, record.rec_type, pos)?;
            } else if record.rec_type == LogRecordType::TxnFinished {
                for txn in pending.remove(&seq_no).unwrap_or_default() {
                    update_index(index, txn.record.key, txn.record.rec_type, txn.pos)?;
                }
            } else {
                record.key = real_key;
                pending
                    .entry(seq_no)
                    .or_default()
                    .push(TransactionRecord { record, pos });
            }

            current_seq_no = current_seq_no.max(seq_no);
            offset += size;
        }

        // Resume appends right after the last valid record
        if i == file_ids.len() - 1 {
            if offset < data_file.size()? {
                tracing::warn!(file_id, offset, "truncating torn tail of active file");
                data_file.truncate(offset)?;
            } else {
                data_file.set_write_off(offset);
            }
        }
    }

    if !pending.is_empty() {
        tracing::warn!(
            batches = pending.len(),
            "discarding records of uncommitted batches"
        );
    }

    Ok(current_seq_no)
}

fn update_index(
    index: &dyn Indexer,
    key: Vec<u8>,
    rec_type: LogRecordType,
    pos: LogRecordPos,
) -> Result<()> {
    match rec_type {
        LogRecordType::Normal => {
            if !index.put(key, pos) {
                return Err(CaskError::IndexUpdateFailed);
            }
        }
        // Deleting a key that was never indexed is fine
        LogRecordType::Deleted => {
            index.delete(&key);
        }
        LogRecordType::TxnFinished => {}
    }
    Ok(())
}
