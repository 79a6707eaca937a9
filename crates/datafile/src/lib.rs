//! # Datafile — one append-only log segment
//!
//! A datafile is a strict concatenation of encoded records named
//! `keg-<id>.db`. Exactly one datafile (the *active* one) accepts appends;
//! every other file is *stale* and read-only. The engine reads values with
//! positioned reads (`pread`), which are safe concurrently with appends on
//! POSIX, so readers never touch the write cursor.
//!
//! The writer handle is opened with `O_APPEND` and every append is a single
//! `write_all`, so a record is never interleaved with another write. The
//! cursor mirrors the on-disk length: it starts at the file size and advances
//! by the number of bytes appended.

use record::{Record, RecordError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default per-file size limit: 256 MiB.
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 256 * 1024 * 1024;

/// Errors from datafile operations.
#[derive(Debug, Error)]
pub enum DatafileError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An append was attempted on a stale datafile or after `close_writer`.
    #[error("datafile {0} is read-only")]
    ReadOnly(u32),

    /// A record-level decode failure (corruption, bad checksum).
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Returns the file name for a datafile id: `keg-<id>.db`.
pub fn file_name(id: u32) -> String {
    format!("keg-{}.db", id)
}

/// Parses a datafile id out of a file name, returning `None` for anything
/// that is not exactly `keg-<digits>.db` (this also skips `keg-tmp.db`).
pub fn parse_file_name(name: &str) -> Option<u32> {
    let id = name.strip_prefix("keg-")?.strip_suffix(".db")?;
    id.parse().ok()
}

/// Lists the datafile ids present in `dir`, sorted ascending.
pub fn list_ids(dir: &Path) -> io::Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(id) = parse_file_name(name) {
                ids.push(id);
            }
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// One `keg-<id>.db` segment: a read handle used for positioned reads, plus
/// an append handle while the file is active.
pub struct Datafile {
    id: u32,
    path: PathBuf,
    reader: File,
    writer: Option<File>,
    /// Write cursor; always equals the on-disk length.
    cursor: u64,
    size_limit: u64,
}

impl Datafile {
    /// Opens datafile `id` in `dir` for appending, creating it if absent.
    pub fn create(dir: &Path, id: u32, size_limit: u64) -> Result<Datafile, DatafileError> {
        let path = dir.join(file_name(id));
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let reader = File::open(&path)?;
        let cursor = writer.metadata()?.len();

        Ok(Datafile {
            id,
            path,
            reader,
            writer: Some(writer),
            cursor,
            size_limit,
        })
    }

    /// Opens an existing datafile read-only. Appends will fail.
    pub fn open_stale(dir: &Path, id: u32) -> Result<Datafile, DatafileError> {
        let path = dir.join(file_name(id));
        let reader = File::open(&path)?;
        let cursor = reader.metadata()?.len();

        Ok(Datafile {
            id,
            path,
            reader,
            writer: None,
            cursor,
            size_limit: DEFAULT_FILE_SIZE_LIMIT,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte length (== the write cursor for the active file).
    pub fn len(&self) -> u64 {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// True once the cursor has grown strictly past the size limit. The
    /// engine checks this after each append, so a single oversized record
    /// ends up alone in its own file rather than split.
    pub fn has_exceeded_limit(&self) -> bool {
        self.cursor > self.size_limit
    }

    /// Appends `bytes` in a single write and returns the offset at which
    /// they begin.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64, DatafileError> {
        let writer = self.writer.as_mut().ok_or(DatafileError::ReadOnly(self.id))?;
        writer.write_all(bytes)?;
        let offset = self.cursor;
        self.cursor += bytes.len() as u64;
        Ok(offset)
    }

    /// Positioned read of exactly `len` bytes at `offset`, independent of the
    /// write cursor.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, DatafileError> {
        let mut buf = vec![0u8; len];
        self.reader.read_exact_at(&mut buf, offset)?;
        Ok(buf)
    }

    /// Decodes the record starting at `offset`.
    pub fn read_record(&self, offset: u64) -> Result<Record, DatafileError> {
        let mut rdr = PositionedReader {
            file: &self.reader,
            pos: offset,
        };
        Ok(Record::decode(&mut rdr)?)
    }

    /// Sequential iterator over `(offset, record)` pairs from the start of
    /// the file. Used by replay and by tests that inspect the raw log.
    pub fn iter(&self) -> Result<RecordIter, DatafileError> {
        let mut file = self.reader.try_clone()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(RecordIter {
            rdr: BufReader::new(file),
            offset: 0,
        })
    }

    /// Flushes and drops the append handle; the file becomes stale.
    pub fn close_writer(&mut self) -> Result<(), DatafileError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// `Read` adapter over `pread` so the record decoder can run at an arbitrary
/// offset without seeking the shared handle.
struct PositionedReader<'a> {
    file: &'a File,
    pos: u64,
}

impl Read for PositionedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Streaming record scanner over a whole datafile.
pub struct RecordIter {
    rdr: BufReader<File>,
    offset: u64,
}

impl RecordIter {
    /// Decodes the next record, returning its starting offset alongside it.
    ///
    /// `Ok(None)` is a clean end of file; decode errors (torn tail,
    /// corruption) pass through for the caller to handle.
    pub fn next_record(&mut self) -> Result<Option<(u64, Record)>, RecordError> {
        match Record::decode(&mut self.rdr) {
            Ok(rec) => {
                let offset = self.offset;
                self.offset += rec.encoded_len();
                Ok(Some((offset, rec)))
            }
            Err(RecordError::EndOfStream) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests;
