use super::*;
use record::Record;
use std::fs;
use tempfile::tempdir;

// -------------------- Naming --------------------

#[test]
fn file_name_and_parse_roundtrip() {
    assert_eq!(file_name(1), "keg-1.db");
    assert_eq!(file_name(42), "keg-42.db");
    assert_eq!(parse_file_name("keg-1.db"), Some(1));
    assert_eq!(parse_file_name("keg-42.db"), Some(42));
}

#[test]
fn parse_rejects_non_datafiles() {
    assert_eq!(parse_file_name("keg-tmp.db"), None);
    assert_eq!(parse_file_name("snapshot.gob"), None);
    assert_eq!(parse_file_name("keg-1.db.bak"), None);
    assert_eq!(parse_file_name("other-1.db"), None);
}

#[test]
fn list_ids_sorted() {
    let dir = tempdir().unwrap();
    for id in [3u32, 1, 10] {
        fs::write(dir.path().join(file_name(id)), b"").unwrap();
    }
    fs::write(dir.path().join("keg-tmp.db"), b"").unwrap();
    fs::write(dir.path().join("snapshot.gob"), b"").unwrap();

    assert_eq!(list_ids(dir.path()).unwrap(), vec![1, 3, 10]);
}

// -------------------- Append & read --------------------

#[test]
fn append_returns_starting_offset() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();

    let off1 = df.append(b"hello").unwrap();
    let off2 = df.append(b"world!").unwrap();
    assert_eq!(off1, 0);
    assert_eq!(off2, 5);
    assert_eq!(df.len(), 11);
}

#[test]
fn read_at_is_independent_of_cursor() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();
    df.append(b"abcdef").unwrap();

    assert_eq!(df.read_at(2, 3).unwrap(), b"cde");
    // reading does not disturb subsequent appends
    let off = df.append(b"gh").unwrap();
    assert_eq!(off, 6);
    assert_eq!(df.read_at(0, 8).unwrap(), b"abcdefgh");
}

#[test]
fn read_past_end_errors() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();
    df.append(b"abc").unwrap();

    assert!(matches!(df.read_at(1, 10), Err(DatafileError::Io(_))));
}

#[test]
fn cursor_resumes_from_existing_length() {
    let dir = tempdir().unwrap();
    {
        let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();
        df.append(b"12345").unwrap();
    }
    let df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();
    assert_eq!(df.len(), 5);
}

// -------------------- Records --------------------

#[test]
fn read_record_at_offset() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();

    let first = Record::put(b"a".to_vec(), b"1".to_vec(), 1);
    let second = Record::put(b"b".to_vec(), b"22".to_vec(), 2);
    df.append(&first.encode()).unwrap();
    let off = df.append(&second.encode()).unwrap();

    assert_eq!(df.read_record(0).unwrap(), first);
    assert_eq!(df.read_record(off).unwrap(), second);
}

#[test]
fn iter_walks_offsets() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();

    let mut expected = Vec::new();
    for i in 0..10u32 {
        let rec = Record::put(
            format!("k{}", i).into_bytes(),
            format!("v{}", i).into_bytes(),
            i,
        );
        let off = df.append(&rec.encode()).unwrap();
        expected.push((off, rec));
    }

    let mut iter = df.iter().unwrap();
    for (off, rec) in &expected {
        let (got_off, got_rec) = iter.next_record().unwrap().unwrap();
        assert_eq!(got_off, *off);
        assert_eq!(&got_rec, rec);
    }
    assert!(iter.next_record().unwrap().is_none());
}

#[test]
fn iter_surfaces_torn_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(file_name(1));
    {
        let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();
        df.append(&Record::put(b"k".to_vec(), b"v".to_vec(), 1).encode())
            .unwrap();
        df.append(&Record::put(b"k2".to_vec(), b"v2".to_vec(), 2).encode())
            .unwrap();
    }
    // chop the last 3 bytes off the second record
    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 3]).unwrap();

    let df = Datafile::open_stale(dir.path(), 1).unwrap();
    let mut iter = df.iter().unwrap();
    let (_, rec) = iter.next_record().unwrap().unwrap();
    assert_eq!(rec.key, b"k");
    assert!(matches!(iter.next_record(), Err(RecordError::Corrupt)));
}

// -------------------- Limits & writer lifecycle --------------------

#[test]
fn limit_check_is_strictly_greater() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, 10).unwrap();

    df.append(b"0123456789").unwrap();
    assert!(!df.has_exceeded_limit());
    df.append(b"x").unwrap();
    assert!(df.has_exceeded_limit());
}

#[test]
fn stale_file_rejects_appends() {
    let dir = tempdir().unwrap();
    {
        let mut df = Datafile::create(dir.path(), 4, DEFAULT_FILE_SIZE_LIMIT).unwrap();
        df.append(b"data").unwrap();
    }

    let mut df = Datafile::open_stale(dir.path(), 4).unwrap();
    assert_eq!(df.len(), 4);
    assert!(matches!(
        df.append(b"more"),
        Err(DatafileError::ReadOnly(4))
    ));
    // reads still work
    assert_eq!(df.read_at(0, 4).unwrap(), b"data");
}

#[test]
fn close_writer_keeps_reads_working() {
    let dir = tempdir().unwrap();
    let mut df = Datafile::create(dir.path(), 1, DEFAULT_FILE_SIZE_LIMIT).unwrap();
    df.append(b"abc").unwrap();
    df.close_writer().unwrap();

    assert!(matches!(df.append(b"x"), Err(DatafileError::ReadOnly(1))));
    assert_eq!(df.read_at(0, 3).unwrap(), b"abc");
}

#[test]
fn open_stale_missing_file_errors() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Datafile::open_stale(dir.path(), 9),
        Err(DatafileError::Io(_))
    ));
}
