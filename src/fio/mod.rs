//! File I/O Module
//!
//! Abstracts the byte-level operations a data file needs, so that other
//! I/O strategies (e.g. memory-mapped reads) can be plugged in later.

mod file_io;

pub use file_io::FileIo;

use std::path::Path;

use crate::error::Result;

/// Byte-level I/O against one underlying file
pub trait IoManager: Send + Sync {
    /// Read into `buf` starting at `offset`, returning the bytes read.
    /// A short count means the end of the file was reached.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Append `buf` at the end of the file
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Flush to durable storage
    fn sync(&self) -> Result<()>;

    /// Current file size in bytes
    fn size(&self) -> Result<u64>;

    /// Cut the file down to `len` bytes
    fn truncate(&self, len: u64) -> Result<()>;
}

/// Open the default I/O manager for `path`
pub fn new_io_manager(path: &Path) -> Result<Box<dyn IoManager>> {
    Ok(Box::new(FileIo::open(path)?))
}
