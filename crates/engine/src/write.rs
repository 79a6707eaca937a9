/// Write path: `put()`, `delete()`, and active-file rollover.
///
/// All mutations flow through this module. Each one is encoded into a record,
/// appended to the active datafile in a single write, and reflected in the
/// keydir only after the append succeeds. The rollover check runs after the
/// append, so a record larger than the file size limit ends up alone in its
/// own datafile rather than split across two.
use anyhow::Result;
use datafile::Datafile;
use keydir::KeyMeta;
use record::Record;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Keg, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Keg {
    /// Inserts or overwrites a key-value pair (the `PUT` command).
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");
        anyhow::ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        anyhow::ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        let rec = Record::put(key, value, unix_seconds()?);
        let (file_id, offset) = self.write_record(&rec)?;
        self.keydir.insert(
            rec.key,
            KeyMeta {
                file_id,
                offset,
                header: rec.header,
            },
        );

        Ok(())
    }

    /// Deletes a key by persisting a tombstone (the `DEL` command).
    ///
    /// Returns `false` without writing anything when the key is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        if !self.keydir.contains_key(key) {
            return Ok(false);
        }

        let rec = Record::tombstone(key.to_vec(), unix_seconds()?);
        self.write_record(&rec)?;
        self.keydir.remove(key);

        Ok(true)
    }

    /// Appends `rec` to the active datafile and returns where it landed.
    /// Rolls the active file over afterwards if the append pushed it past
    /// its size limit.
    pub(crate) fn write_record(&mut self, rec: &Record) -> Result<(u32, u64)> {
        let encoded = rec.encode();
        let offset = self.active.append(&encoded)?;
        let file_id = self.active.id();

        if self.active.has_exceeded_limit() {
            self.rotate_active()?;
        }

        Ok((file_id, offset))
    }

    /// Moves the active datafile into the stale set and opens a fresh one
    /// with the next id.
    fn rotate_active(&mut self) -> Result<()> {
        let next_id = self.active.id() + 1;
        let new_active = Datafile::create(&self.data_dir, next_id, self.file_size_limit)?;

        let mut old = std::mem::replace(&mut self.active, new_active);
        old.close_writer()?;
        tracing::debug!(file_id = old.id(), len = old.len(), "rotated active datafile");
        self.stale.insert(old.id(), old);

        Ok(())
    }
}

/// Current time as unix seconds, the timestamp resolution of the record
/// header.
pub(crate) fn unix_seconds() -> Result<u32> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as u32)
}
