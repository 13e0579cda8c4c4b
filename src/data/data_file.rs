//! Data File
//!
//! Append-only file of encoded log records with random-offset reads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CaskError, Result};
use crate::fio::{new_io_manager, IoManager};

use super::log_record::{
    decode_header, log_record_crc, LogRecord, LogRecordPos, LogRecordType,
    MAX_LOG_RECORD_HEADER_SIZE,
};

/// Suffix of every data file ("000000042.data")
pub const DATA_FILE_NAME_SUFFIX: &str = ".data";

/// Key -> position records written by merge
pub const HINT_FILE_NAME: &str = "hint-index";

/// Single record marking a completed merge
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";

/// An append-only file of log records
///
/// ## Concurrency:
/// - All methods take `&self`; the engine serializes appends under its
///   write lock while reads may run concurrently.
/// - `write_off` is atomic so sealed files can be shared via `Arc`.
pub struct DataFile {
    /// File id (0 for hint and merge-finished files)
    file_id: u32,

    /// Offset the next append lands at
    write_off: AtomicU64,

    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Open or create the data file with the given id in `dir`
    pub fn open(dir: &Path, file_id: u32) -> Result<Self> {
        Self::open_path(&Self::file_path(dir, file_id), file_id)
    }

    /// Open or create the hint file in `dir`
    pub fn open_hint_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(HINT_FILE_NAME), 0)
    }

    /// Open or create the merge-finished file in `dir`
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(MERGE_FINISHED_FILE_NAME), 0)
    }

    fn open_path(path: &Path, file_id: u32) -> Result<Self> {
        let io = new_io_manager(path)?;
        let write_off = io.size()?;
        Ok(Self {
            file_id,
            write_off: AtomicU64::new(write_off),
            io,
        })
    }

    /// "{dir}/000000042.data"
    pub fn file_path(dir: &Path, file_id: u32) -> PathBuf {
        dir.join(format!("{:09}{}", file_id, DATA_FILE_NAME_SUFFIX))
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        self.write_off.load(Ordering::SeqCst)
    }

    pub fn set_write_off(&self, offset: u64) {
        self.write_off.store(offset, Ordering::SeqCst);
    }

    /// Read the record starting at `offset`
    ///
    /// Returns:
    /// - `Ok(Some((record, size)))`: a complete, checksummed record
    /// - `Ok(None)`: end of valid data (EOF, or a truncated tail record)
    /// - `Err(InvalidCrc)`: a complete record whose checksum mismatches
    pub fn read_log_record(&self, offset: u64) -> Result<Option<(LogRecord, u64)>> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Ok(None);
        }

        // The header is variable-length; read the maximum or up to EOF
        let header_len = (MAX_LOG_RECORD_HEADER_SIZE as u64).min(file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_len];
        let n = self.io.read(&mut header_buf, offset)?;

        let (header, header_size) = match decode_header(&header_buf[..n]) {
            Some(decoded) => decoded,
            None => return Ok(None),
        };

        // Zero-filled tail
        if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
            return Ok(None);
        }

        if header.key_size < 0 || header.value_size < 0 {
            return Err(CaskError::CorruptedRecord(format!(
                "negative sizes in file {} at offset {}",
                self.file_id, offset
            )));
        }

        let record_size = (header_size as u64)
            .saturating_add(header.key_size as u64)
            .saturating_add(header.value_size as u64);

        // Partially written record from a crash
        if offset.saturating_add(record_size) > file_size {
            return Ok(None);
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let mut kv = vec![0u8; key_size + value_size];
        if self.io.read(&mut kv, offset + header_size as u64)? < kv.len() {
            return Ok(None);
        }
        let value = kv.split_off(key_size);
        let key = kv;

        let crc = log_record_crc(&header_buf[4..header_size], &key, &value);
        if crc != header.crc {
            return Err(CaskError::InvalidCrc {
                file_id: self.file_id,
                offset,
            });
        }

        let rec_type = LogRecordType::from_u8(header.rec_type).ok_or_else(|| {
            CaskError::CorruptedRecord(format!("unknown record type {}", header.rec_type))
        })?;

        Ok(Some((
            LogRecord {
                key,
                value,
                rec_type,
            },
            record_size,
        )))
    }

    /// Append raw bytes, advancing the write offset
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let n = self.io.write(buf)?;
        self.write_off.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }

    /// Append a hint entry: key -> encoded position
    pub fn write_hint_record(&self, key: &[u8], pos: &LogRecordPos) -> Result<()> {
        let record = LogRecord::normal(key.to_vec(), pos.encode());
        self.write(&record.encode())?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    pub fn size(&self) -> Result<u64> {
        self.io.size()
    }

    /// Drop everything past `len` (torn tail after a crash)
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.io.truncate(len)?;
        self.set_write_off(len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_naming() {
        let path = DataFile::file_path(Path::new("/db"), 42);
        assert_eq!(path, PathBuf::from("/db/000000042.data"));
    }

    #[test]
    fn test_write_advances_offset() {
        let temp = TempDir::new().unwrap();
        let file = DataFile::open(temp.path(), 0).unwrap();
        assert_eq!(file.write_off(), 0);

        file.write(b"abc").unwrap();
        file.write(b"de").unwrap();
        assert_eq!(file.write_off(), 5);
        assert_eq!(file.size().unwrap(), 5);
    }

    #[test]
    fn test_reopen_resumes_offset() {
        let temp = TempDir::new().unwrap();
        {
            let file = DataFile::open(temp.path(), 3).unwrap();
            file.write(b"0123456789").unwrap();
            file.sync().unwrap();
        }
        let file = DataFile::open(temp.path(), 3).unwrap();
        assert_eq!(file.file_id(), 3);
        assert_eq!(file.write_off(), 10);
    }
}
