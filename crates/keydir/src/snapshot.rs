//! Keydir snapshot codec.
//!
//! The snapshot lets a restart skip full log replay: the engine serializes
//! the whole keydir, and `open` deserializes it instead of scanning every
//! datafile.
//!
//! ## File layout
//!
//! ```text
//! [magic: u32 LE "KEGS"][version: u16 LE][count: u64 LE]
//! then per entry:
//! [key_len: u32 LE][key bytes][file_id: u32 LE][offset: u64 LE]
//! [header: 17 bytes, record layout]
//! ```
//!
//! The header tuple reuses the record header serialization, so the snapshot
//! round-trips exactly what the keydir holds.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use record::{Header, HEADER_LEN};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::{KeyDir, KeyMeta};

/// Magic identifying a keydir snapshot ("KEGS").
pub const SNAPSHOT_MAGIC: u32 = 0x5347_454B;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Errors from snapshot serialization.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the snapshot magic.
    #[error("not a keydir snapshot (bad magic)")]
    BadMagic,

    /// The file declares a version this build cannot read.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),

    /// Truncated entries or an invalid embedded header.
    #[error("corrupt snapshot")]
    Corrupt,
}

/// Serializes `keydir` to `w`.
pub fn write_snapshot<W: Write>(w: &mut W, keydir: &KeyDir) -> Result<(), SnapshotError> {
    w.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
    w.write_u16::<LittleEndian>(SNAPSHOT_VERSION)?;
    w.write_u64::<LittleEndian>(keydir.len() as u64)?;

    let mut header_buf = Vec::with_capacity(HEADER_LEN);
    for (key, meta) in keydir.iter() {
        w.write_u32::<LittleEndian>(key.len() as u32)?;
        w.write_all(key)?;
        w.write_u32::<LittleEndian>(meta.file_id)?;
        w.write_u64::<LittleEndian>(meta.offset)?;

        header_buf.clear();
        meta.header.write_to(&mut header_buf);
        w.write_all(&header_buf)?;
    }

    Ok(())
}

/// Deserializes a keydir from `r`.
pub fn read_snapshot<R: Read>(r: &mut R) -> Result<KeyDir, SnapshotError> {
    let magic = r.read_u32::<LittleEndian>().map_err(short)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let version = r.read_u16::<LittleEndian>().map_err(short)?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let count = r.read_u64::<LittleEndian>().map_err(short)?;
    let mut keydir = KeyDir::with_capacity(count.min(1 << 20) as usize);

    for _ in 0..count {
        let key_len = r.read_u32::<LittleEndian>().map_err(short)? as usize;
        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key).map_err(short)?;

        let file_id = r.read_u32::<LittleEndian>().map_err(short)?;
        let offset = r.read_u64::<LittleEndian>().map_err(short)?;

        let mut header_buf = [0u8; HEADER_LEN];
        r.read_exact(&mut header_buf).map_err(short)?;
        let header = Header::parse(&header_buf).map_err(|_| SnapshotError::Corrupt)?;

        keydir.insert(key, KeyMeta { file_id, offset, header });
    }

    Ok(keydir)
}

/// A snapshot that ends mid-entry is corrupt, not a clean EOF.
fn short(e: io::Error) -> SnapshotError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SnapshotError::Corrupt
    } else {
        SnapshotError::Io(e)
    }
}
