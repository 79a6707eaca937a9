/// Read path: `get()` and `keys()`.
///
/// Point lookups never scan disk: the keydir identifies the datafile and
/// offset, the value is fetched with one positioned read, and the CRC-32 is
/// verified against the header the keydir kept from write time.
use anyhow::Result;
use record::{RecordError, HEADER_LEN};

use crate::Keg;

impl Keg {
    /// Looks up a key, returning `None` if it is absent.
    ///
    /// Reads exactly `value_size` bytes at `offset + 17 + key_size` in the
    /// datafile the keydir points at. A keydir entry whose file id resolves
    /// to no open datafile returns `None` rather than failing — it means the
    /// directory is stale (it should not happen, but it must not crash).
    ///
    /// # Errors
    ///
    /// Fails with [`RecordError::InvalidChecksum`] when the stored CRC-32
    /// does not match the bytes on disk, or with an I/O error from the read.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let meta = match self.keydir.get(key) {
            Some(meta) => *meta,
            None => return Ok(None),
        };

        let df = match self.resolve(meta.file_id) {
            Some(df) => df,
            None => return Ok(None),
        };

        let value_offset = meta.offset + HEADER_LEN as u64 + meta.header.key_size as u64;
        let value = df.read_at(value_offset, meta.header.value_size as usize)?;

        if record::checksum(&value) != meta.header.checksum {
            return Err(RecordError::InvalidChecksum.into());
        }

        Ok(Some(value))
    }

    /// Snapshot of the current key set; order unspecified.
    #[must_use]
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.keydir.keys()
    }
}
