use std::io::{self, Read};
use std::mem::size_of;

use crate::error::Error;

/// Tombstone sentinel written by [`crate::Db::delete`]. A `Get` that resolves to this exact
/// value is reported to the caller as [`Error::NotFound`].
pub const DELETED: &str = "DELETED";

/// Size in bytes of the two length prefixes (total size + key length).
const PREFIX_SIZE: usize = size_of::<u32>() * 2;

/// Stack buffer used by [`read_value_from`] and segment replay for the common case of small
/// records, avoiding a heap allocation on the hot path.
pub const SMALL_RECORD_BUF: usize = 8192;

/// Record
///
/// One on-disk record: a length-prefixed `(key, value)` pair.
///
/// ```text
/// 0          4          8       8+key_len   12+key_len
/// |----------|----------|-----------|-----------|-------------------|
/// | size u32 | klen u32 |    key    | vlen  u32 |       value       |
/// |----------|----------|-----------|-----------|-------------------|
/// ```
///
/// `size` is the total length of the record, including the 4 bytes of `size` itself.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Total on-disk size of this record, `12 + key_len + value_len`.
    pub fn encoded_len(&self) -> usize {
        PREFIX_SIZE + size_of::<u32>() + self.key.len() + self.value.len()
    }

    /// Encode into the on-disk byte layout described above.
    pub fn encode(&self) -> Vec<u8> {
        let key_bytes = self.key.as_bytes();
        let value_bytes = self.value.as_bytes();
        let total_size = PREFIX_SIZE + size_of::<u32>() + key_bytes.len() + value_bytes.len();

        let mut buf = Vec::with_capacity(total_size);
        buf.extend_from_slice(&(total_size as u32).to_le_bytes());
        buf.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(key_bytes);
        buf.extend_from_slice(&(value_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(value_bytes);
        buf
    }

    /// Decode a buffer previously produced by [`Record::encode`].
    ///
    /// Rejects a buffer whose declared `size` prefix does not match the buffer's own length.
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < PREFIX_SIZE {
            return Err(Error::CorruptRecord);
        }
        let declared_size = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        if declared_size != buf.len() {
            return Err(Error::CorruptRecord);
        }

        let key_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let key_end = 8 + key_len;
        if buf.len() < key_end + size_of::<u32>() {
            return Err(Error::CorruptRecord);
        }
        let key = std::str::from_utf8(&buf[8..key_end])
            .map_err(|_| Error::CorruptRecord)?
            .to_owned();

        let value_len =
            u32::from_le_bytes(buf[key_end..key_end + 4].try_into().unwrap()) as usize;
        let value_start = key_end + 4;
        let value_end = value_start + value_len;
        if buf.len() != value_end {
            return Err(Error::CorruptRecord);
        }
        let value = std::str::from_utf8(&buf[value_start..value_end])
            .map_err(|_| Error::CorruptRecord)?
            .to_owned();

        Ok(Record { key, value })
    }
}

/// Stream a single value field out of a reader positioned at the start of a record.
///
/// Skips the size prefix and the key, reading only as much as is needed to return the value.
/// Used by [`crate::segment::Segment::fetch`], which has no use for the key once it has already
/// seeked to the record it wants.
pub fn read_value_from<R: Read>(reader: &mut R) -> Result<String, Error> {
    let mut prefix = [0u8; PREFIX_SIZE];
    reader.read_exact(&mut prefix)?;
    let key_len = u32::from_le_bytes(prefix[4..8].try_into().unwrap()) as usize;

    skip_exact(reader, key_len)?;

    let mut value_len_buf = [0u8; 4];
    reader.read_exact(&mut value_len_buf)?;
    let value_len = u32::from_le_bytes(value_len_buf) as usize;

    let mut value_buf = vec![0u8; value_len];
    reader.read_exact(&mut value_buf)?;
    String::from_utf8(value_buf).map_err(|_| Error::CorruptRecord)
}

fn skip_exact<R: Read>(reader: &mut R, mut n: usize) -> io::Result<()> {
    let mut scratch = [0u8; 256];
    while n > 0 {
        let chunk = n.min(scratch.len());
        reader.read_exact(&mut scratch[..chunk])?;
        n -= chunk;
    }
    Ok(())
}
