/// Keydir snapshot persistence.
///
/// The snapshot file lets `open` skip full log replay. It is rewritten
/// atomically: serialize to a `.tmp` next to the target, fsync, then rename
/// over the previous snapshot, so a crash never leaves a partially written
/// file behind.
use anyhow::{Context, Result};
use keydir::KeyDir;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::Keg;

/// Name of the keydir snapshot within the data directory.
pub const SNAPSHOT_FILE: &str = "snapshot.gob";

/// Temp file used during atomic snapshot writes.
const SNAPSHOT_TMP_FILE: &str = "snapshot.gob.tmp";

impl Keg {
    /// Persists the current keydir to `<data_dir>/snapshot.gob`.
    pub fn save_snapshot(&self) -> Result<()> {
        let tmp_path = self.data_dir.join(SNAPSHOT_TMP_FILE);

        {
            let file = File::create(&tmp_path).with_context(|| {
                format!("failed to create snapshot temp {}", tmp_path.display())
            })?;
            let mut w = BufWriter::new(file);
            keydir::snapshot::write_snapshot(&mut w, &self.keydir)?;
            w.flush()?;
            w.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, self.data_dir.join(SNAPSHOT_FILE))?;
        tracing::debug!(entries = self.keydir.len(), "keydir snapshot saved");
        Ok(())
    }

    /// Replaces the live keydir with the one stored in the snapshot file.
    pub fn load_snapshot(&mut self) -> Result<()> {
        self.keydir = load_keydir(&self.data_dir.join(SNAPSHOT_FILE))?;
        Ok(())
    }
}

/// Reads a keydir out of a snapshot file.
pub(crate) fn load_keydir(path: &Path) -> Result<KeyDir> {
    let file = File::open(path)
        .with_context(|| format!("failed to open snapshot {}", path.display()))?;
    let mut rdr = BufReader::new(file);
    Ok(keydir::snapshot::read_snapshot(&mut rdr)?)
}
