//! Merge (compaction)
//!
//! Rewrites the live records of all sealed data files into a fresh file
//! set in a sibling directory, together with a hint file and a
//! merge-finished marker. The next [`Engine::open`] swaps the merged files
//! in and seeds the index from the hint file.
//!
//! ## Merge Directory
//! ```text
//! {parent}/{base}-merge/
//!   ├── 000000000.data ...   rewritten live records
//!   ├── hint-index           real key -> new position
//!   └── merge-finished       "merge.finished" -> boundary file id
//! ```
//!
//! A record is live only if the index still points at exactly its file id
//! and offset; any other copy was overwritten or deleted later.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{encode_key_with_seq, parse_key_with_seq, NON_TRANSACTION_SEQ_NO};
use crate::config::Config;
use crate::data::{DataFile, LogRecord};
use crate::engine::Engine;
use crate::error::{CaskError, Result};

/// Suffix appended to the data directory's name for the merge directory
pub const MERGE_DIR_SUFFIX: &str = "-merge";

/// Key of the single record in the merge-finished file
pub const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Sibling directory a merge of `dir` writes into
pub fn merge_path(dir: &Path) -> PathBuf {
    match dir.file_name() {
        Some(name) => {
            let mut merge_name = name.to_os_string();
            merge_name.push(MERGE_DIR_SUFFIX);
            dir.with_file_name(merge_name)
        }
        None => dir.join(MERGE_DIR_SUFFIX.trim_start_matches('-')),
    }
}

/// Clears the merge flag however the merge ends
struct MergingGuard<'a> {
    engine: &'a Engine,
}

impl Drop for MergingGuard<'_> {
    fn drop(&mut self) {
        self.engine.state.write().is_merging = false;
    }
}

impl Engine {
    /// Compact all sealed data files
    ///
    /// Steps:
    /// 1. Under the write lock: seal the active file; its successor's id is
    ///    the merge boundary and everything below it gets merged
    /// 2. Without the lock: rewrite live records through a private engine
    ///    rooted at the merge directory, recording hint entries
    /// 3. Sync, then write the merge-finished marker
    ///
    /// Fails with `MergeInProgress` if another merge is running.
    pub fn merge(&self) -> Result<()> {
        let (merge_files, non_merge_file_id) = {
            let mut state = self.state.write();
            if state.active_file.is_none() {
                return Ok(());
            }
            if state.is_merging {
                return Err(CaskError::MergeInProgress);
            }

            let active = self.rotate_active_file(&mut state)?;
            state.is_merging = true;

            let mut files: Vec<Arc<DataFile>> = state.older_files.values().cloned().collect();
            files.sort_by_key(|f| f.file_id());
            (files, active.file_id())
        };
        let _guard = MergingGuard { engine: self };

        tracing::info!(
            files = merge_files.len(),
            non_merge_file_id,
            "merge started"
        );

        let merge_dir = merge_path(&self.config.dir_path);
        if merge_dir.exists() {
            fs::remove_dir_all(&merge_dir)?;
        }
        fs::create_dir_all(&merge_dir)?;

        let merge_config = Config {
            dir_path: merge_dir.clone(),
            sync_writes: false,
            ..self.config.clone()
        };
        let merge_db = Engine::open(merge_config)?;
        let hint_file = DataFile::open_hint_file(&merge_dir)?;

        let mut rewritten = 0usize;
        {
            let mut merge_state = merge_db.state.write();

            for data_file in &merge_files {
                let mut offset = 0;
                while let Some((mut record, size)) = data_file.read_log_record(offset)? {
                    let (real_key, _) = parse_key_with_seq(&record.key).ok_or_else(|| {
                        CaskError::CorruptedRecord(format!(
                            "bad key encoding at file {} offset {}",
                            data_file.file_id(),
                            offset
                        ))
                    })?;

                    let is_live = self.index.get(&real_key).is_some_and(|pos| {
                        pos.file_id == data_file.file_id() && pos.offset == offset
                    });

                    if is_live {
                        record.key = encode_key_with_seq(&real_key, NON_TRANSACTION_SEQ_NO);
                        let pos = merge_db.append_log_record(&mut merge_state, &record)?;
                        hint_file.write_hint_record(&real_key, &pos)?;
                        rewritten += 1;
                    }

                    offset += size;
                }
            }
        }

        hint_file.sync()?;
        merge_db.close()?;

        let finished_file = DataFile::open_merge_finished_file(&merge_dir)?;
        let finished = LogRecord::normal(
            MERGE_FINISHED_KEY.to_vec(),
            non_merge_file_id.to_string().into_bytes(),
        );
        finished_file.write(&finished.encode())?;
        finished_file.sync()?;

        tracing::info!(rewritten, non_merge_file_id, "merge finished");
        Ok(())
    }
}
