use std::fs;
use std::path::Path;

/// Counts the `keg-<id>.db` datafiles in `dir`.
pub fn count_datafiles(dir: &Path) -> usize {
    datafile::list_ids(dir).unwrap().len()
}

/// Reads the raw on-disk bytes of datafile `id`.
pub fn read_datafile(dir: &Path, id: u32) -> Vec<u8> {
    fs::read(dir.join(datafile::file_name(id))).unwrap()
}

/// Overwrites the raw on-disk bytes of datafile `id` in place.
pub fn write_datafile(dir: &Path, id: u32, bytes: &[u8]) {
    fs::write(dir.join(datafile::file_name(id)), bytes).unwrap();
}
