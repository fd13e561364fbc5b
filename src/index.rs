//! The in-memory `key hash -> locator` map. This is the sole source of
//! truth for "where is the current value for this key" while the store is
//! open; it is reconstructed from a sidecar index file (or, failing that,
//! a full log scan) on every open and persisted back out on close and
//! after every compaction.

use std::collections::HashMap;

/// Identifies where the current record for a key hash lives.
///
/// Intentionally carries no key bytes: the on-disk sidecar format doesn't
/// have room for them either. Collision safety is instead provided by
/// re-decoding the on-disk record on every [`crate::store::Store::get`] and
/// comparing its stored key against the one the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub file_id: i64,
    pub size: u32,
    pub offset: u32,
    pub timestamp: u32,
    pub expire_time: u32,
}

/// The flat `hash -> Locator` map. No ordering, one entry per live key.
#[derive(Default)]
pub struct Index {
    map: HashMap<u64, Locator>,
}

impl Index {
    pub fn new() -> Self {
        Index { map: HashMap::new() }
    }

    /// Unconditionally replaces the locator for `hash`.
    pub fn upsert(&mut self, hash: u64, locator: Locator) {
        self.map.insert(hash, locator);
    }

    /// Looks up the current locator for `hash`.
    pub fn lookup(&self, hash: u64) -> Option<Locator> {
        self.map.get(&hash).copied()
    }

    /// Drops `hash` from the map, returning its prior locator if present.
    pub fn remove(&mut self, hash: u64) -> Option<Locator> {
        self.map.remove(&hash)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over every `(hash, locator)` pair, in arbitrary order, for
    /// persistence to a sidecar index file.
    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Locator)> {
        self.map.iter()
    }

    /// The distinct set of hashes currently indexed, snapshotted so callers
    /// can iterate while mutating locators in place.
    pub fn hashes(&self) -> Vec<u64> {
        self.map.keys().copied().collect()
    }

    /// The distinct set of data file ids referenced by any locator, for
    /// `Recovery` to open read-only handles against.
    pub fn referenced_file_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.map.values().map(|l| l.file_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
