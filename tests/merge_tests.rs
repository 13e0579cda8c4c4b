//! Tests for merge
//!
//! These tests verify:
//! - Merge keeps every live value and drops stale copies
//! - The next open installs merged files and loads the hint file
//! - Unfinished merge directories are discarded
//! - An install interrupted by a crash is resumed on the next open
//! - Writes racing with or following a merge are not lost

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use caskkv::data::{DataFile, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME};
use caskkv::merge::merge_path;
use caskkv::{CaskError, Config, Engine};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// The merge directory is a sibling of the data directory, so the data
/// directory lives one level below the temp root.
fn setup_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("db");
    (temp_dir, dir)
}

fn open_engine(dir: &Path) -> Engine {
    let config = Config::builder()
        .dir_path(dir)
        .data_file_size(512)
        .build();
    Engine::open(config).unwrap()
}

fn data_file_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".data"))
        .count()
}

fn key(i: usize) -> Vec<u8> {
    format!("key{:04}", i).into_bytes()
}

/// 200 keys, each overwritten once, every fourth one deleted
fn populate(engine: &Engine) {
    for i in 0..200 {
        engine.put(&key(i), b"old").unwrap();
    }
    for i in 0..200 {
        engine.put(&key(i), format!("new{}", i).as_bytes()).unwrap();
    }
    for i in (0..200).step_by(4) {
        engine.delete(&key(i)).unwrap();
    }
}

/// Boundary recorded in the merge directory's finished marker
fn merge_boundary(merge_dir: &Path) -> u32 {
    let marker = DataFile::open_merge_finished_file(merge_dir).unwrap();
    let (record, _) = marker.read_log_record(0).unwrap().unwrap();
    String::from_utf8(record.value).unwrap().parse().unwrap()
}

/// Ids of the data files in `dir`, ascending
fn data_file_ids(dir: &Path) -> Vec<u32> {
    let mut ids: Vec<u32> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.strip_suffix(".data").map(|stem| stem.parse().unwrap())
        })
        .collect();
    ids.sort_unstable();
    ids
}

/// Populate, merge and close, leaving the merge directory uninstalled
fn merged_but_not_installed(dir: &Path) -> PathBuf {
    let engine = open_engine(dir);
    populate(&engine);
    engine.merge().unwrap();
    engine.close().unwrap();

    let merge_dir = merge_path(dir);
    assert!(merge_dir.join(MERGE_FINISHED_FILE_NAME).is_file());
    merge_dir
}

fn assert_populated(engine: &Engine) {
    assert_eq!(engine.key_count(), 150);
    for i in 0..200 {
        if i % 4 == 0 {
            assert!(matches!(engine.get(&key(i)), Err(CaskError::KeyNotFound)));
        } else {
            assert_eq!(engine.get(&key(i)).unwrap(), format!("new{}", i).into_bytes());
        }
    }
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_empty_engine() {
    let (_temp, dir) = setup_db_dir();
    let engine = open_engine(&dir);

    engine.merge().unwrap();

    assert!(!merge_path(&dir).exists());
}

#[test]
fn test_merge_preserves_live_values() {
    let (_temp, dir) = setup_db_dir();
    let engine = open_engine(&dir);
    populate(&engine);

    engine.merge().unwrap();

    // The running engine is unaffected until the next open
    assert_populated(&engine);
    let merge_dir = merge_path(&dir);
    assert!(merge_dir.join(HINT_FILE_NAME).is_file());
    assert!(merge_dir.join(MERGE_FINISHED_FILE_NAME).is_file());
}

#[test]
fn test_merge_writes_one_hint_per_live_key() {
    let (_temp, dir) = setup_db_dir();
    let engine = open_engine(&dir);
    populate(&engine);

    engine.merge().unwrap();

    let hint_file = DataFile::open_hint_file(&merge_path(&dir)).unwrap();
    let mut offset = 0;
    let mut entries = 0;
    while let Some((_, size)) = hint_file.read_log_record(offset).unwrap() {
        entries += 1;
        offset += size;
    }
    assert_eq!(entries, engine.key_count());
}

#[test]
fn test_reopen_installs_merged_files() {
    let (_temp, dir) = setup_db_dir();
    let files_before;

    {
        let engine = open_engine(&dir);
        populate(&engine);
        engine.merge().unwrap();
        engine.close().unwrap();
        files_before = data_file_count(&dir);
    }

    let engine = open_engine(&dir);

    assert!(!merge_path(&dir).exists());
    assert!(dir.join(HINT_FILE_NAME).is_file());
    assert!(dir.join(MERGE_FINISHED_FILE_NAME).is_file());
    assert!(data_file_count(&dir) < files_before);
    assert_populated(&engine);
}

#[test]
fn test_writes_after_merge_survive_reopen() {
    let (_temp, dir) = setup_db_dir();

    {
        let engine = open_engine(&dir);
        populate(&engine);
        engine.merge().unwrap();

        engine.put(&key(1), b"after-merge").unwrap();
        engine.delete(&key(2)).unwrap();
        engine.put(b"fresh", b"value").unwrap();
    }

    let engine = open_engine(&dir);
    assert_eq!(engine.get(&key(1)).unwrap(), b"after-merge".to_vec());
    assert!(matches!(engine.get(&key(2)), Err(CaskError::KeyNotFound)));
    assert_eq!(engine.get(b"fresh").unwrap(), b"value".to_vec());
    assert_eq!(engine.key_count(), 150);
}

#[test]
fn test_repeated_merges() {
    let (_temp, dir) = setup_db_dir();

    {
        let engine = open_engine(&dir);
        populate(&engine);
        engine.merge().unwrap();
    }
    {
        let engine = open_engine(&dir);
        for i in (1..200).step_by(4) {
            engine.put(&key(i), format!("new{}", i).as_bytes()).unwrap();
        }
        engine.merge().unwrap();
    }

    let engine = open_engine(&dir);
    assert_populated(&engine);
}

#[test]
fn test_unfinished_merge_is_discarded() {
    let (_temp, dir) = setup_db_dir();

    {
        let engine = open_engine(&dir);
        engine.put(b"key", b"value").unwrap();
    }

    // A merge that crashed before writing its finished marker
    let merge_dir = merge_path(&dir);
    fs::create_dir_all(&merge_dir).unwrap();
    fs::write(DataFile::file_path(&merge_dir, 0), b"partial merge output").unwrap();

    let engine = open_engine(&dir);
    assert!(!merge_dir.exists());
    assert_eq!(engine.get(b"key").unwrap(), b"value".to_vec());
}

#[test]
fn test_install_resumes_after_crash_mid_move() {
    let (_temp, dir) = setup_db_dir();
    let merge_dir = merged_but_not_installed(&dir);
    let boundary = merge_boundary(&merge_dir);
    let merged_ids = data_file_ids(&merge_dir);
    assert!(merged_ids.len() > 1);

    // Crash after the old files were dropped and the hint file plus the
    // first merged data file were moved in
    for file_id in data_file_ids(&dir) {
        if file_id < boundary {
            fs::remove_file(DataFile::file_path(&dir, file_id)).unwrap();
        }
    }
    fs::rename(merge_dir.join(HINT_FILE_NAME), dir.join(HINT_FILE_NAME)).unwrap();
    fs::rename(
        DataFile::file_path(&merge_dir, merged_ids[0]),
        DataFile::file_path(&dir, merged_ids[0]),
    )
    .unwrap();

    let engine = open_engine(&dir);
    assert!(!merge_dir.exists());
    assert!(dir.join(MERGE_FINISHED_FILE_NAME).is_file());
    for file_id in &merged_ids {
        assert!(DataFile::file_path(&dir, *file_id).is_file());
    }
    assert_populated(&engine);
}

#[test]
fn test_install_resumes_after_crash_mid_delete() {
    let (_temp, dir) = setup_db_dir();
    let merge_dir = merged_but_not_installed(&dir);

    // Crash while dropping the old files, before anything was moved
    let first_old = data_file_ids(&dir)[0];
    fs::remove_file(DataFile::file_path(&dir, first_old)).unwrap();

    let engine = open_engine(&dir);
    assert!(!merge_dir.exists());
    assert_populated(&engine);
}

#[test]
fn test_install_with_only_marker_left_behind() {
    let (_temp, dir) = setup_db_dir();
    let merge_dir = merged_but_not_installed(&dir);
    let boundary = merge_boundary(&merge_dir);

    // Crash right before the marker was moved
    for file_id in data_file_ids(&dir) {
        if file_id < boundary {
            fs::remove_file(DataFile::file_path(&dir, file_id)).unwrap();
        }
    }
    fs::rename(merge_dir.join(HINT_FILE_NAME), dir.join(HINT_FILE_NAME)).unwrap();
    for file_id in data_file_ids(&merge_dir) {
        fs::rename(
            DataFile::file_path(&merge_dir, file_id),
            DataFile::file_path(&dir, file_id),
        )
        .unwrap();
    }

    let engine = open_engine(&dir);
    assert!(!merge_dir.exists());
    assert_populated(&engine);
}

#[test]
fn test_merge_with_concurrent_writes() {
    let (_temp, dir) = setup_db_dir();

    {
        let engine = Arc::new(open_engine(&dir));
        populate(&engine);

        let writer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200 {
                    engine.put(&key(i), format!("racing{}", i).as_bytes()).unwrap();
                }
            })
        };

        engine.merge().unwrap();
        writer.join().unwrap();
    }

    let engine = open_engine(&dir);
    assert_eq!(engine.key_count(), 200);
    for i in 0..200 {
        assert_eq!(engine.get(&key(i)).unwrap(), format!("racing{}", i).into_bytes());
    }
}
