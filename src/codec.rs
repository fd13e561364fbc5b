//! On-disk binary layouts for records (in `*.data` files) and index entries
//! (in `*.index` sidecar files), and their CRC32-guarded encode/decode pairs.
//!
//! Every decode verifies the checksum before touching any other field, so a
//! torn or corrupted entry is never partially trusted.

use crate::error::{Error, Result};

/// Fixed header size of an encoded [`Record`]: CRC32(4) + TIMESTAMP(8) +
/// KEY_SIZE(4) + VALUE_SIZE(4).
pub const RECORD_HEADER_LEN: usize = 20;

/// Fixed size of an encoded [`IndexEntry`].
pub const INDEX_ENTRY_LEN: usize = 36;

/// A single key/value log entry as it appears (sans CRC, which is derived)
/// in a `*.data` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    /// The number of bytes this record occupies once encoded.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.key.len() + self.value.len()
    }
}

/// Encodes `record` to its on-disk byte layout:
/// `| CRC32(4) | TIMESTAMP(8) | KEY_SIZE(4) | VALUE_SIZE(4) | KEY | VALUE |`.
pub fn encode_record(record: &Record) -> Vec<u8> {
    let mut buf = vec![0u8; record.encoded_len()];
    buf[4..12].copy_from_slice(&record.timestamp.to_le_bytes());
    buf[12..16].copy_from_slice(&(record.key.len() as u32).to_le_bytes());
    buf[16..20].copy_from_slice(&(record.value.len() as u32).to_le_bytes());
    buf[20..20 + record.key.len()].copy_from_slice(&record.key);
    buf[20 + record.key.len()..].copy_from_slice(&record.value);
    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Decodes a [`Record`] from `buf`, verifying its CRC32 first.
///
/// Returns [`Error::Corruption`] if the checksum doesn't match or the
/// declared key/value sizes don't account for every byte of `buf`.
pub fn decode_record(buf: &[u8]) -> Result<Record> {
    if buf.len() < RECORD_HEADER_LEN {
        return Err(Error::Corruption(format!(
            "record of {} bytes is shorter than the {RECORD_HEADER_LEN}-byte header",
            buf.len()
        )));
    }

    let stored_crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let actual_crc = crc32fast::hash(&buf[4..]);
    if stored_crc != actual_crc {
        return Err(Error::Corruption(format!(
            "record checksum mismatch: stored {stored_crc:#010x}, computed {actual_crc:#010x}"
        )));
    }

    let timestamp = u64::from_le_bytes(buf[4..12].try_into().unwrap());
    let key_size = u32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;
    let value_size = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;

    if RECORD_HEADER_LEN + key_size + value_size != buf.len() {
        return Err(Error::Corruption(format!(
            "record declares {key_size} key bytes and {value_size} value bytes \
             but the buffer has {} bytes after the header",
            buf.len() - RECORD_HEADER_LEN
        )));
    }

    let key = buf[20..20 + key_size].to_vec();
    let value = buf[20 + key_size..].to_vec();
    Ok(Record { timestamp, key, value })
}

/// A sidecar index entry: a snapshot of one [`crate::index::Locator`] keyed
/// by its key hash, as it appears in a `*.index` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub key_hash: u64,
    pub file_id: i64,
    pub timestamp: u32,
    pub expire_time: u32,
    pub size: u32,
    pub offset: u32,
}

/// Encodes `entry` to its fixed 36-byte on-disk layout:
/// `| CRC32(4) | KEY_HASH(8) | FILE_ID(8) | TIMESTAMP(4) | EXPIRE_TIME(4) | SIZE(4) | OFFSET(4) |`.
pub fn encode_index_entry(entry: &IndexEntry) -> [u8; INDEX_ENTRY_LEN] {
    let mut buf = [0u8; INDEX_ENTRY_LEN];
    buf[4..12].copy_from_slice(&entry.key_hash.to_le_bytes());
    buf[12..20].copy_from_slice(&entry.file_id.to_le_bytes());
    buf[20..24].copy_from_slice(&entry.timestamp.to_le_bytes());
    buf[24..28].copy_from_slice(&entry.expire_time.to_le_bytes());
    buf[28..32].copy_from_slice(&entry.size.to_le_bytes());
    buf[32..36].copy_from_slice(&entry.offset.to_le_bytes());
    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Decodes an [`IndexEntry`] from a 36-byte `buf`, verifying its CRC32 first.
pub fn decode_index_entry(buf: &[u8]) -> Result<IndexEntry> {
    if buf.len() != INDEX_ENTRY_LEN {
        return Err(Error::Corruption(format!(
            "index entry has {} bytes, expected {INDEX_ENTRY_LEN}",
            buf.len()
        )));
    }

    let stored_crc = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let actual_crc = crc32fast::hash(&buf[4..]);
    if stored_crc != actual_crc {
        return Err(Error::Corruption(format!(
            "index entry checksum mismatch: stored {stored_crc:#010x}, computed {actual_crc:#010x}"
        )));
    }

    Ok(IndexEntry {
        key_hash: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
        file_id: i64::from_le_bytes(buf[12..20].try_into().unwrap()),
        timestamp: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        expire_time: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        size: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
        offset: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
    })
}
