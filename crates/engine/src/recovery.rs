/// Log replay and reindexing.
///
/// This is the cold-start path when no keydir snapshot exists: every
/// datafile is scanned in ascending id order, and the keydir is rebuilt from
/// the records themselves. Tombstones drop entries; live records win when
/// their timestamp is newer than (or equal to — the scan is in physical
/// order, so later records break ties) the entry already present.
///
/// A record that fails to decode mid-file is treated as a torn tail write
/// from a crash: the rest of that file is ignored and the scan continues
/// with the next datafile.
use anyhow::{Context, Result};
use datafile::Datafile;
use keydir::{KeyDir, KeyMeta};
use record::RecordError;
use std::collections::HashMap;
use std::path::Path;

use crate::Keg;

/// Rebuilds a keydir by replaying every datafile in `data_dir`, returning it
/// together with the opened (stale) datafiles.
pub(crate) fn replay(data_dir: &Path) -> Result<(KeyDir, HashMap<u32, Datafile>)> {
    let ids = datafile::list_ids(data_dir)?;
    let mut keydir = KeyDir::new();
    let mut stale = HashMap::with_capacity(ids.len());

    if !ids.is_empty() {
        tracing::info!(files = ids.len(), "replaying datafiles");
    }

    for id in ids {
        let df = Datafile::open_stale(data_dir, id)
            .with_context(|| format!("failed to open datafile {}", id))?;
        scan_datafile(&df, &mut keydir)?;
        stale.insert(id, df);
    }

    Ok((keydir, stale))
}

/// Applies every decodable record in `df` to `keydir`.
fn scan_datafile(df: &Datafile, keydir: &mut KeyDir) -> Result<()> {
    let mut iter = df.iter()?;

    loop {
        match iter.next_record() {
            Ok(Some((offset, rec))) => {
                if rec.header.is_deleted {
                    keydir.remove(&rec.key);
                    continue;
                }

                let newer = match keydir.get(&rec.key) {
                    Some(existing) => existing.header.timestamp <= rec.header.timestamp,
                    None => true,
                };
                if newer {
                    keydir.insert(
                        rec.key,
                        KeyMeta {
                            file_id: df.id(),
                            offset,
                            header: rec.header,
                        },
                    );
                }
            }
            Ok(None) => return Ok(()),
            Err(RecordError::Corrupt) | Err(RecordError::InvalidChecksum) => {
                // Torn tail write. Everything after it in this file is
                // unreachable; earlier records are already applied.
                tracing::warn!(
                    file = %df.path().display(),
                    "corrupt record mid-file, ignoring the rest of the file"
                );
                return Ok(());
            }
            Err(RecordError::EndOfStream) => unreachable!("iterator maps EOF to None"),
            Err(RecordError::Io(e)) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("replay failed reading {}", df.path().display())));
            }
        }
    }
}

impl Keg {
    /// Discards the in-memory state and rebuilds it from disk (the `INDEX`
    /// command): closes every handle, replays the datafiles, and opens a
    /// fresh active file with the next id.
    pub fn reindex(&mut self) -> Result<()> {
        self.active.close_writer()?;
        self.stale.clear();

        let (keydir, stale) = replay(&self.data_dir)?;

        let next_id = stale.keys().max().map_or(1, |max| max + 1);
        self.active = Datafile::create(&self.data_dir, next_id, self.file_size_limit)?;
        self.stale = stale;
        self.keydir = keydir;

        tracing::info!(keys = self.keydir.len(), "reindex complete");
        Ok(())
    }
}
