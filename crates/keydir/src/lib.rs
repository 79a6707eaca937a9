//! # Keydir — the in-memory directory
//!
//! Maps every live key to the on-disk location of its most recent value:
//! `(file_id, offset, header)`. The offset points at the record *header*, and
//! the header snapshot lets the engine read and verify the value without
//! re-parsing the on-disk bytes.
//!
//! Tombstoned keys are never present: `delete` removes the entry after the
//! tombstone record is persisted, and recovery drops entries when it replays
//! a tombstone.
//!
//! The keydir is the sole structure serialized into the snapshot file; see
//! [`snapshot`] for the on-disk layout.

pub mod snapshot;

use record::Header;
use rustc_hash::FxHashMap;

/// Location of a key's most recent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMeta {
    /// Datafile that holds the record.
    pub file_id: u32,
    /// Byte offset of the record header within that file.
    pub offset: u64,
    /// Header as written, kept for verified reads.
    pub header: Header,
}

/// In-memory key directory.
#[derive(Debug, Default)]
pub struct KeyDir {
    map: FxHashMap<Box<[u8]>, KeyMeta>,
}

impl KeyDir {
    pub fn new() -> KeyDir {
        KeyDir::default()
    }

    pub fn with_capacity(capacity: usize) -> KeyDir {
        KeyDir {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn insert(&mut self, key: Vec<u8>, meta: KeyMeta) {
        self.map.insert(key.into_boxed_slice(), meta);
    }

    pub fn get(&self, key: &[u8]) -> Option<&KeyMeta> {
        self.map.get(key)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<KeyMeta> {
        self.map.remove(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(key, meta)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &KeyMeta)> {
        self.map.iter().map(|(k, m)| (k.as_ref(), m))
    }

    /// Copies out the current key set; order unspecified.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.map.keys().map(|k| k.to_vec()).collect()
    }
}
