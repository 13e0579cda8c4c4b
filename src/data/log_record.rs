//! Log record codec
//!
//! Binary encoding of a single record as it appears in data, hint and
//! merge-finished files.
//!
//! ## Record Format
//! ```text
//! ┌──────────┬─────────┬──────────────┬──────────────┬───────┬─────────┐
//! │ CRC (4)  │ Type(1) │ KeySize (≤5) │ ValSize (≤5) │  Key  │  Value  │
//! └──────────┴─────────┴──────────────┴──────────────┴───────┴─────────┘
//! ```
//! - CRC: little-endian CRC32 (IEEE) over everything after the CRC field
//! - KeySize / ValSize: zigzag varints

use bytes::{BufMut, Bytes, BytesMut};

/// Largest possible header: crc (4) + type (1) + two 32-bit varints (5 + 5)
pub const MAX_LOG_RECORD_HEADER_SIZE: usize = 4 + 1 + MAX_VARINT_LEN32 * 2;

/// Smallest decodable header: crc (4) + type (1)
const MIN_HEADER_PREFIX: usize = 5;

/// Bytes a varint in the 32-bit domain can occupy
const MAX_VARINT_LEN32: usize = 5;

/// Bytes a varint in the 64-bit domain can occupy
const MAX_VARINT_LEN64: usize = 10;

/// Kind of mutation a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live key/value pair
    Normal = 0,

    /// A tombstone
    Deleted = 1,

    /// Terminal marker of a committed batch
    TxnFinished = 2,
}

impl LogRecordType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Normal),
            1 => Some(Self::Deleted),
            2 => Some(Self::TxnFinished),
            _ => None,
        }
    }
}

/// A single record appended to a data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

impl LogRecord {
    pub fn normal(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
            rec_type: LogRecordType::Normal,
        }
    }

    pub fn deleted(key: Vec<u8>) -> Self {
        Self {
            key,
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        }
    }

    /// Encode into the on-disk layout
    ///
    /// The CRC is computed last, over the header (minus the CRC itself),
    /// key and value.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            MAX_LOG_RECORD_HEADER_SIZE + self.key.len() + self.value.len(),
        );

        buf.put_u32_le(0); // CRC placeholder
        buf.put_u8(self.rec_type as u8);
        encode_varint(self.key.len() as i64, &mut buf);
        encode_varint(self.value.len() as i64, &mut buf);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        let crc = crc32fast::hash(&buf[4..]);
        buf[..4].copy_from_slice(&crc.to_le_bytes());

        buf.freeze()
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordHeader {
    pub crc: u32,
    /// Raw type byte; validated only after the CRC matches
    pub rec_type: u8,
    pub key_size: i64,
    pub value_size: i64,
}

/// Decode a header from the start of `buf`
///
/// Returns the header and the number of bytes it occupies, or `None` if
/// `buf` is too short to hold a complete header.
pub fn decode_header(buf: &[u8]) -> Option<(LogRecordHeader, usize)> {
    if buf.len() < MIN_HEADER_PREFIX {
        return None;
    }

    let crc = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let rec_type = buf[4];

    let mut index = MIN_HEADER_PREFIX;
    let (key_size, n) = decode_varint(&buf[index..])?;
    index += n;
    let (value_size, n) = decode_varint(&buf[index..])?;
    index += n;

    Some((
        LogRecordHeader {
            crc,
            rec_type,
            key_size,
            value_size,
        },
        index,
    ))
}

/// CRC of a record given its encoded header (without the CRC field)
pub fn log_record_crc(header: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

// =============================================================================
// Record Position
// =============================================================================

/// Location of one encoded record on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: u64,
}

impl LogRecordPos {
    /// Encode as `uvarint(file_id) ‖ uvarint(offset)` (hint file values)
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(MAX_VARINT_LEN32 + MAX_VARINT_LEN64);
        encode_uvarint(self.file_id as u64, &mut buf);
        encode_uvarint(self.offset, &mut buf);
        buf.to_vec()
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        let (file_id, n) = decode_uvarint(buf)?;
        let (offset, _) = decode_uvarint(&buf[n..])?;
        Some(Self {
            file_id: u32::try_from(file_id).ok()?,
            offset,
        })
    }
}

// =============================================================================
// Varints
// =============================================================================

/// Append `value` as an unsigned LEB128 varint
pub fn encode_uvarint(mut value: u64, buf: &mut BytesMut) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decode an unsigned varint, returning (value, bytes consumed)
pub fn decode_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_LEN64) {
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte < 0x80 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Append `value` as a zigzag-encoded signed varint
pub fn encode_varint(value: i64, buf: &mut BytesMut) {
    encode_uvarint(((value << 1) ^ (value >> 63)) as u64, buf);
}

/// Decode a zigzag-encoded signed varint
pub fn decode_varint(buf: &[u8]) -> Option<(i64, usize)> {
    let (zigzag, n) = decode_uvarint(buf)?;
    Some((((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64), n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_known_layout() {
        let record = LogRecord::normal(b"name".to_vec(), b"bitcask-go".to_vec());
        let encoded = record.encode();

        let mut expected = vec![104, 82, 240, 150, 0, 8, 20];
        expected.extend_from_slice(b"name");
        expected.extend_from_slice(b"bitcask-go");
        assert_eq!(&encoded[..], &expected[..]);
    }

    #[test]
    fn test_decode_header_empty_value() {
        let (header, size) = decode_header(&[9, 252, 88, 14, 0, 8, 0]).unwrap();
        assert_eq!(size, 7);
        assert_eq!(header.crc, 240712713);
        assert_eq!(header.rec_type, LogRecordType::Normal as u8);
        assert_eq!(header.key_size, 4);
        assert_eq!(header.value_size, 0);
    }

    #[test]
    fn test_decode_header_deleted() {
        let (header, size) = decode_header(&[43, 153, 86, 17, 1, 8, 20]).unwrap();
        assert_eq!(size, 7);
        assert_eq!(header.crc, 290887979);
        assert_eq!(header.rec_type, LogRecordType::Deleted as u8);
        assert_eq!(header.value_size, 10);
    }

    #[test]
    fn test_decode_header_insufficient_data() {
        assert!(decode_header(&[]).is_none());
        assert!(decode_header(&[1, 2, 3, 4]).is_none());
        // crc + type present but the size varints are cut off
        assert!(decode_header(&[1, 2, 3, 4, 0, 0x80]).is_none());
    }

    #[test]
    fn test_crc_over_header_key_value() {
        let crc = log_record_crc(&[0, 8, 20], b"name", b"bitcask-go");
        assert_eq!(crc, 2532332136);
    }

    #[test]
    fn test_varint_boundaries() {
        for value in [0i64, 1, -1, 63, 64, -64, -65, i32::MAX as i64, i32::MIN as i64] {
            let mut buf = BytesMut::new();
            encode_varint(value, &mut buf);
            assert!(buf.len() <= MAX_VARINT_LEN32);
            assert_eq!(decode_varint(&buf), Some((value, buf.len())));
        }
    }

    #[test]
    fn test_record_pos_encoding() {
        let pos = LogRecordPos {
            file_id: 7,
            offset: 1 << 40,
        };
        assert_eq!(LogRecordPos::decode(&pos.encode()), Some(pos));
        assert_eq!(LogRecordPos::decode(&[0x80]), None);
    }
}
