//! # Record — on-disk record format
//!
//! Every mutation (`PUT` or `DEL`) is serialized into a binary record and
//! appended to the active datafile. Records are the only thing a datafile
//! contains: no padding, no framing between them.
//!
//! ## Binary layout
//!
//! ```text
//! [checksum: u32 LE][timestamp: u32 LE][is_deleted: u8]
//! [key_size: u32 LE][value_size: u32 LE][key bytes][value bytes]
//! ```
//!
//! The header is always 17 bytes. `checksum` is CRC-32 (IEEE) over the value
//! bytes only, `timestamp` is unix seconds at write time, and tombstones
//! carry `is_deleted = 1` with an empty value.
//!
//! ## Example
//!
//! ```rust
//! use record::Record;
//! use std::io::Cursor;
//!
//! let rec = Record::put(b"hello".to_vec(), b"world".to_vec(), 1_700_000_000);
//! let bytes = rec.encode();
//! let decoded = Record::decode(&mut Cursor::new(bytes)).unwrap();
//! assert_eq!(decoded, rec);
//! ```

use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};
use thiserror::Error;

/// Fixed header length in bytes: checksum + timestamp + deleted flag +
/// key_size + value_size.
pub const HEADER_LEN: usize = 4 + 4 + 1 + 4 + 4;

/// Sanity cap on `key_size` during decode. Anything larger is treated as
/// corruption rather than an allocation request.
const MAX_KEY_SIZE: u32 = 64 * 1024 * 1024;

/// Sanity cap on `value_size` during decode.
const MAX_VALUE_SIZE: u32 = 1024 * 1024 * 1024;

/// Errors produced while decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Clean end of input at a record boundary. Not a failure: the previous
    /// record was the last one.
    #[error("end of stream")]
    EndOfStream,

    /// A record that starts but does not finish (truncated header or body),
    /// or whose header fields are not believable.
    #[error("corrupt record")]
    Corrupt,

    /// The CRC-32 computed over the value does not match the header.
    #[error("record has invalid checksum")]
    InvalidChecksum,
}

/// The fixed-size record header, kept verbatim in the keydir so reads can be
/// verified without re-parsing the on-disk bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// CRC-32 (IEEE) over the value bytes only.
    pub checksum: u32,
    /// Unix seconds at write time.
    pub timestamp: u32,
    /// True for tombstones.
    pub is_deleted: bool,
    pub key_size: u32,
    pub value_size: u32,
}

impl Header {
    /// Serializes the header into `buf` (appends exactly [`HEADER_LEN`] bytes).
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.push(self.is_deleted as u8);
        buf.extend_from_slice(&self.key_size.to_le_bytes());
        buf.extend_from_slice(&self.value_size.to_le_bytes());
    }

    /// Parses a header out of exactly [`HEADER_LEN`] bytes.
    ///
    /// Returns `Corrupt` if the deleted flag is neither 0 nor 1 or the sizes
    /// are beyond the sanity caps.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Header, RecordError> {
        let mut rdr = &bytes[..];
        let checksum = rdr.read_u32::<LittleEndian>()?;
        let timestamp = rdr.read_u32::<LittleEndian>()?;
        let deleted = rdr.read_u8()?;
        let key_size = rdr.read_u32::<LittleEndian>()?;
        let value_size = rdr.read_u32::<LittleEndian>()?;

        if deleted > 1 {
            return Err(RecordError::Corrupt);
        }
        if key_size == 0 || key_size > MAX_KEY_SIZE || value_size > MAX_VALUE_SIZE {
            return Err(RecordError::Corrupt);
        }

        Ok(Header {
            checksum,
            timestamp,
            is_deleted: deleted == 1,
            key_size,
            value_size,
        })
    }
}

/// A single key-value record (or tombstone) as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// CRC-32 (IEEE) over `value`, the checksum stored in every header.
pub fn checksum(value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(value);
    hasher.finalize()
}

impl Record {
    /// Builds a live record, computing the value checksum.
    pub fn put(key: Vec<u8>, value: Vec<u8>, timestamp: u32) -> Record {
        let header = Header {
            checksum: checksum(&value),
            timestamp,
            is_deleted: false,
            key_size: key.len() as u32,
            value_size: value.len() as u32,
        };
        Record { header, key, value }
    }

    /// Builds a tombstone: deleted flag set, empty value, CRC over no bytes.
    pub fn tombstone(key: Vec<u8>, timestamp: u32) -> Record {
        let header = Header {
            checksum: checksum(&[]),
            timestamp,
            is_deleted: true,
            key_size: key.len() as u32,
            value_size: 0,
        };
        Record {
            header,
            key,
            value: Vec::new(),
        }
    }

    /// Total encoded size in bytes: header + key + value.
    pub fn encoded_len(&self) -> u64 {
        HEADER_LEN as u64 + self.key.len() as u64 + self.value.len() as u64
    }

    /// Serializes the record: 17-byte header followed by raw key and value.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        self.header.write_to(&mut buf);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        buf
    }

    /// Reads one record from `r`.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (zero bytes before the header) -> `EndOfStream`; the
    ///   caller is at a record boundary and the stream simply ended.
    /// - **Partial header or body** (e.g. a torn write at a crashed tail) ->
    ///   `Corrupt`.
    /// - **CRC mismatch over the value** -> `InvalidChecksum`.
    /// - Any other I/O failure -> `Io`.
    pub fn decode<R: Read>(r: &mut R) -> Result<Record, RecordError> {
        let mut header_buf = [0u8; HEADER_LEN];

        // The first read distinguishes a clean EOF from a truncated header:
        // zero bytes here is a record boundary, anything short after is not.
        let n = r.read(&mut header_buf)?;
        if n == 0 {
            return Err(RecordError::EndOfStream);
        }
        if n < HEADER_LEN {
            r.read_exact(&mut header_buf[n..]).map_err(truncated)?;
        }

        let header = Header::parse(&header_buf)?;

        let mut key = vec![0u8; header.key_size as usize];
        r.read_exact(&mut key).map_err(truncated)?;

        let mut value = vec![0u8; header.value_size as usize];
        r.read_exact(&mut value).map_err(truncated)?;

        if checksum(&value) != header.checksum {
            return Err(RecordError::InvalidChecksum);
        }

        Ok(Record { header, key, value })
    }
}

/// Maps an `UnexpectedEof` mid-record onto `Corrupt`; a record that starts
/// must finish.
fn truncated(e: io::Error) -> RecordError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        RecordError::Corrupt
    } else {
        RecordError::Io(e)
    }
}
