use crate::*;
use anyhow::Result;
use record::RecordError;
use tempfile::tempdir;

use super::helpers::{read_datafile, write_datafile};

// --------------------- Lookups ---------------------

#[test]
fn get_missing_key_is_none() -> Result<()> {
    let dir = tempdir()?;
    let keg = Keg::open(dir.path(), DEFAULT_FILE_SIZE_LIMIT)?;
    assert_eq!(keg.get(b"nope")?, None);
    Ok(())
}

#[test]
fn keys_lists_live_keys_only() -> Result<()> {
    let dir = tempdir()?;
    let mut keg = Keg::open(dir.path(), DEFAULT_FILE_SIZE_LIMIT)?;

    keg.put(b"a".to_vec(), b"1".to_vec())?;
    keg.put(b"b".to_vec(), b"2".to_vec())?;
    keg.put(b"c".to_vec(), b"3".to_vec())?;
    keg.delete(b"b")?;

    let mut keys = keg.keys();
    keys.sort();
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
    Ok(())
}

#[test]
fn binary_keys_and_values() -> Result<()> {
    let dir = tempdir()?;
    let mut keg = Keg::open(dir.path(), DEFAULT_FILE_SIZE_LIMIT)?;

    let key = vec![0x00u8, 0xFF, 0x80, 0x01];
    let val = vec![0xDEu8, 0xAD, 0xBE, 0xEF];
    keg.put(key.clone(), val.clone())?;
    assert_eq!(keg.get(&key)?, Some(val));
    Ok(())
}

// --------------------- Checksum verification ---------------------

#[test]
fn corrupted_value_fails_with_invalid_checksum() -> Result<()> {
    let dir = tempdir()?;
    let mut keg = Keg::open(dir.path(), DEFAULT_FILE_SIZE_LIMIT)?;

    keg.put(b"key".to_vec(), b"value".to_vec())?;
    let id = keg.active_file_id();

    // flip the last byte of the record's value on disk
    let mut bytes = read_datafile(dir.path(), id);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    write_datafile(dir.path(), id, &bytes);

    let err = keg.get(b"key").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecordError>(),
        Some(RecordError::InvalidChecksum)
    ));
    Ok(())
}

#[test]
fn untouched_keys_still_read_after_sibling_corruption() -> Result<()> {
    let dir = tempdir()?;
    let mut keg = Keg::open(dir.path(), DEFAULT_FILE_SIZE_LIMIT)?;

    keg.put(b"good".to_vec(), b"fine".to_vec())?;
    keg.put(b"bad".to_vec(), b"broken".to_vec())?;
    let id = keg.active_file_id();

    let mut bytes = read_datafile(dir.path(), id);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    write_datafile(dir.path(), id, &bytes);

    assert_eq!(keg.get(b"good")?, Some(b"fine".to_vec()));
    assert!(keg.get(b"bad").is_err());
    Ok(())
}
