/// Merge (compaction): rewrites every live record into a fresh datafile.
///
/// Overwritten values and tombstones take up space in the log until a merge
/// reclaims it. The merge walks the keydir — which by construction references
/// only the latest live record per key — and copies each record into a temp
/// file. The swap then happens in two renames: the fsynced temp file is
/// first installed under the provisional name `keg-1.db.new`, the original
/// `keg-<id>.db` files are deleted, and only then is the provisional file
/// renamed to `keg-1.db`, a new active file opened with id 2, and the keydir
/// replaced with entries pointing at file 1.
///
/// At every step the disk holds a complete copy of the live data: the
/// original datafiles until the provisional rename, the merged file from
/// then on. A failure before the provisional rename leaves the originals
/// intact (the orphan temp file is removed on the next `open`); a failure
/// or crash after it leaves the complete merged file, and `open` finishes
/// the interrupted swap.
use anyhow::{anyhow, Context, Result};
use datafile::Datafile;
use keydir::{KeyDir, KeyMeta};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::{Keg, MERGED_FILE_ID, MERGE_NEW_FILE, MERGE_TMP_FILE};

impl Keg {
    /// Compacts the store down to one stale datafile (`keg-1.db`) holding
    /// every live record, plus a fresh empty active file (`keg-2.db`).
    ///
    /// Tombstones never appear in the output: the keydir holds no entry for
    /// a deleted key, so nothing references them.
    pub fn merge(&mut self) -> Result<()> {
        let tmp_path = self.data_dir.join(MERGE_TMP_FILE);

        let entries = match self.write_merge_file(&tmp_path) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        // The temp file is complete and durable. Install it under the
        // provisional name before touching the originals, so a failure or
        // crash while deleting them cannot lose the only copy of a record:
        // `open` rolls a leftover provisional file forward.
        let new_path = self.data_dir.join(MERGE_NEW_FILE);
        if let Err(e) = fs::rename(&tmp_path, &new_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        self.active.close_writer()?;
        self.stale.clear();
        for id in datafile::list_ids(&self.data_dir)? {
            fs::remove_file(self.data_dir.join(datafile::file_name(id)))?;
        }
        fs::rename(&new_path, self.data_dir.join(datafile::file_name(MERGED_FILE_ID)))?;

        let merged = Datafile::open_stale(&self.data_dir, MERGED_FILE_ID)?;
        self.stale.insert(MERGED_FILE_ID, merged);
        self.active =
            Datafile::create(&self.data_dir, MERGED_FILE_ID + 1, self.file_size_limit)?;

        let mut keydir = KeyDir::with_capacity(entries.len());
        for (key, meta) in entries {
            keydir.insert(key, meta);
        }
        self.keydir = keydir;

        tracing::info!(keys = self.keydir.len(), "merge complete");
        Ok(())
    }

    /// Copies every live record into the temp file, fsyncs it, and returns
    /// the keydir entries for the merged layout.
    fn write_merge_file(&self, tmp_path: &Path) -> Result<Vec<(Vec<u8>, KeyMeta)>> {
        let file = File::create(tmp_path)
            .with_context(|| format!("failed to create merge temp {}", tmp_path.display()))?;
        let mut out = BufWriter::new(file);

        let mut entries = Vec::with_capacity(self.keydir.len());
        let mut cursor = 0u64;

        for (key, meta) in self.keydir.iter() {
            let df = self
                .resolve(meta.file_id)
                .ok_or_else(|| anyhow!("keydir references unknown datafile {}", meta.file_id))?;
            let rec = df.read_record(meta.offset).with_context(|| {
                format!(
                    "merge failed reading record at {}:{}",
                    meta.file_id, meta.offset
                )
            })?;

            // Re-encode with the original header so the timestamp and
            // checksum carry over unchanged.
            let encoded = rec.encode();
            out.write_all(&encoded)?;

            entries.push((
                key.to_vec(),
                KeyMeta {
                    file_id: MERGED_FILE_ID,
                    offset: cursor,
                    header: rec.header,
                },
            ));
            cursor += encoded.len() as u64;
        }

        out.flush()?;
        out.get_ref().sync_all()?;

        Ok(entries)
    }
}
