//! # Engine — the KegDB storage engine
//!
//! The central orchestrator that ties together the [`record`], [`datafile`],
//! and [`keydir`] crates into a complete Bitcask-style key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                    KEG                        │
//! │                                               │
//! │ write.rs → encode record → append to active   │
//! │              |                                │
//! │              |  (size limit exceeded?)        │
//! │              |            yes                 │
//! │              v                                │
//! │           rollover → new active datafile      │
//! │                                               │
//! │ read.rs  → keydir lookup → pread value        │
//! │              → CRC-32 verify                  │
//! │                                               │
//! │ merge.rs → rewrite live records → keg-1.db    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | `lib.rs`      | `Keg` struct, open/close, accessors, `Debug`         |
//! | [`recovery`]  | Log replay into a fresh keydir, reindex              |
//! | [`write`]     | `put()`, `delete()`, active-file rollover            |
//! | [`read`]      | `get()`, `keys()`                                    |
//! | [`merge`]     | Compaction into a fresh `keg-1.db`                   |
//! | [`snapshot`]  | Atomic keydir snapshot save/load                     |
//!
//! ## Crash safety
//!
//! Every mutation is a single append to the active datafile; the keydir is
//! updated only after the append succeeds. Recovery replays the datafiles in
//! id order and tolerates a torn record at a file tail. The merge output and
//! the keydir snapshot are both written to a temp path, fsynced, and renamed
//! into place.

mod merge;
mod read;
mod recovery;
mod snapshot;
mod write;

use anyhow::{Context, Result};
use datafile::Datafile;
use keydir::KeyDir;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use datafile::DEFAULT_FILE_SIZE_LIMIT;
pub use snapshot::SNAPSHOT_FILE;

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (256 MiB).
pub const MAX_VALUE_SIZE: usize = 256 * 1024 * 1024;

/// Temp file used while a merge is writing its output.
pub(crate) const MERGE_TMP_FILE: &str = "keg-tmp.db";

/// Provisional name a completed merge output carries while the original
/// datafiles are being deleted.
pub(crate) const MERGE_NEW_FILE: &str = "keg-1.db.new";

/// Id of the datafile a merge leaves behind; the fresh active file gets the
/// next one.
pub(crate) const MERGED_FILE_ID: u32 = 1;

/// The Bitcask-style storage engine: one active datafile receiving appends,
/// a set of stale read-only datafiles, and the in-memory keydir locating the
/// most recent value for every live key.
///
/// # Write path
///
/// 1. Build a record with the current unix-seconds timestamp and a CRC-32
///    over the value.
/// 2. Append it to the active datafile (one `write_all`).
/// 3. Point the keydir entry at `(active id, offset, header)`.
/// 4. If the active file grew past its size limit, rotate in a new one.
///
/// # Read path
///
/// 1. Keydir lookup.
/// 2. `pread` exactly `value_size` bytes at `offset + 17 + key_size` from
///    the identified datafile.
/// 3. Verify the CRC-32 against the header's checksum.
///
/// # Recovery
///
/// [`Keg::open`] loads the keydir snapshot when one exists, otherwise
/// replays every datafile in id order.
pub struct Keg {
    pub(crate) data_dir: PathBuf,
    pub(crate) file_size_limit: u64,
    pub(crate) active: Datafile,
    /// Read-only datafiles by id.
    pub(crate) stale: HashMap<u32, Datafile>,
    pub(crate) keydir: KeyDir,
}

impl std::fmt::Debug for Keg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keg")
            .field("data_dir", &self.data_dir)
            .field("file_size_limit", &self.file_size_limit)
            .field("active_file_id", &self.active.id())
            .field("stale_files", &self.stale.len())
            .field("keys", &self.keydir.len())
            .finish()
    }
}

impl Keg {
    /// Opens (or creates) a store in `data_dir`.
    ///
    /// # Recovery steps
    ///
    /// 1. Create `data_dir` if it does not exist.
    /// 2. Remove an orphan `keg-tmp.db` left by a merge that failed before
    ///    installing its output; finish the swap for a `keg-1.db.new` left
    ///    by a merge interrupted after it.
    /// 3. If `snapshot.gob` exists, load the keydir from it and open every
    ///    on-disk datafile read-only; a snapshot that fails to parse is
    ///    logged and recovery falls back to replay.
    /// 4. Otherwise replay every datafile in ascending id order.
    /// 5. Open a fresh active datafile with id `max(existing) + 1` (1 for an
    ///    empty directory).
    pub fn open<P: AsRef<Path>>(data_dir: P, file_size_limit: u64) -> Result<Keg> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        // A merge interrupted before the provisional rename never installed
        // its output; the original datafiles are authoritative.
        let merge_tmp = data_dir.join(MERGE_TMP_FILE);
        if merge_tmp.exists() {
            tracing::warn!(path = %merge_tmp.display(), "removing orphan merge temp file");
            let _ = std::fs::remove_file(&merge_tmp);
        }

        // A merge interrupted after the provisional rename left a complete
        // merged file, but may have deleted some of the originals already.
        // The merged file is authoritative: finish the swap.
        let merge_new = data_dir.join(MERGE_NEW_FILE);
        if merge_new.exists() {
            tracing::warn!(path = %merge_new.display(), "completing interrupted merge");
            for id in datafile::list_ids(&data_dir)? {
                std::fs::remove_file(data_dir.join(datafile::file_name(id)))?;
            }
            std::fs::rename(&merge_new, data_dir.join(datafile::file_name(MERGED_FILE_ID)))?;
        }

        let snapshot_path = data_dir.join(SNAPSHOT_FILE);
        let (keydir, stale) = if snapshot_path.exists() {
            match snapshot::load_keydir(&snapshot_path) {
                Ok(keydir) => {
                    let mut stale = HashMap::new();
                    for id in datafile::list_ids(&data_dir)? {
                        stale.insert(id, Datafile::open_stale(&data_dir, id)?);
                    }
                    tracing::info!(entries = keydir.len(), "loaded keydir snapshot");
                    (keydir, stale)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "snapshot unreadable, replaying datafiles");
                    recovery::replay(&data_dir)?
                }
            }
        } else {
            recovery::replay(&data_dir)?
        };

        let next_id = stale.keys().max().map_or(1, |max| max + 1);
        let active = Datafile::create(&data_dir, next_id, file_size_limit)?;

        Ok(Keg {
            data_dir,
            file_size_limit,
            active,
            stale,
            keydir,
        })
    }

    /// Closes the active writer and releases every datafile handle. The
    /// engine accepts no further writes afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.active.close_writer()?;
        self.stale.clear();
        Ok(())
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keydir.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keydir.is_empty()
    }

    /// Id of the datafile currently receiving appends.
    #[must_use]
    pub fn active_file_id(&self) -> u32 {
        self.active.id()
    }

    /// Ids of the stale (read-only) datafiles, sorted ascending.
    #[must_use]
    pub fn stale_file_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.stale.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolves a keydir file id to its datafile, if the engine still holds
    /// a handle for it.
    pub(crate) fn resolve(&self, file_id: u32) -> Option<&Datafile> {
        if file_id == self.active.id() {
            Some(&self.active)
        } else {
            self.stale.get(&file_id)
        }
    }
}

#[cfg(test)]
mod tests;
