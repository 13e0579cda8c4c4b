//! Data Module
//!
//! On-disk representation: the log record codec and the data files that
//! hold encoded records.
//!
//! ## Directory Layout
//! ```text
//! {dir}/
//!   ├── 000000000.data     older data file (read-only)
//!   ├── 000000001.data     active data file (appends)
//!   ├── hint-index         key -> position, produced by merge
//!   └── merge-finished     merge boundary, produced by merge
//! ```

mod data_file;
mod log_record;

pub use data_file::{
    DataFile, DATA_FILE_NAME_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
};
pub use log_record::{
    decode_header, decode_uvarint, decode_varint, encode_uvarint, encode_varint,
    log_record_crc, LogRecord, LogRecordHeader, LogRecordPos, LogRecordType,
    MAX_LOG_RECORD_HEADER_SIZE,
};
