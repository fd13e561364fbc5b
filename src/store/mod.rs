//! The storage engine entry point: a single [`Store`] value that owns the
//! index, the file registry, and the active-file write cursor, replacing
//! the reference implementation's process-wide globals.
//!
//! `Store::open` runs recovery (see [`recovery`]); `Store::put`/`get`/
//! `remove` are the Writer and point-lookup path; `Store::compact` and the
//! automatic compaction check in `open` delegate to [`compact`].

mod compact;
mod recovery;

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{self, IndexEntry, Record};
use crate::config::Options;
use crate::crypto::Cryptor;
use crate::error::{Error, Result};
use crate::hash;
use crate::index::{Index, Locator};
use crate::registry::{pread, Registry};

/// An open, append-only key-value store.
///
/// `Store` owns every mutable piece of engine state; there is no
/// module-level state anywhere in this crate. Cloning a `Store` is not
/// supported - share it behind an `Arc` if multiple threads need it, the
/// same way callers would share any other `Sync` resource.
pub struct Store {
    options: Options,
    cryptor: Cryptor,
    state: RwLock<State>,
}

/// Everything guarded by the single reader-writer lock described in the
/// concurrency model: the index, the registry (including its open-handle
/// table), and the identity of the active file.
struct State {
    index: Index,
    registry: Registry,
    active_version: i64,
    active_file: Arc<std::fs::File>,
    write_offset: u64,
}

impl Store {
    /// Opens or creates a store at `options.directory`, recovering any
    /// existing data (see [`recovery::recover`]).
    pub fn open(options: Options) -> Result<Store> {
        options.validate()?;
        let cryptor = if options.enable_encryption {
            Cryptor::aes128cbc(&options.secret)?
        } else {
            Cryptor::disabled()
        };

        let recovered = recovery::recover(&options, &cryptor)?;
        Ok(Store {
            options,
            cryptor,
            state: RwLock::new(State {
                index: recovered.index,
                registry: recovered.registry,
                active_version: recovered.active_version,
                active_file: recovered.active_file,
                write_offset: recovered.write_offset,
            }),
        })
    }

    /// Writes `value` under `key`. Never expires.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with_expiry(key, value, 0)
    }

    /// Writes `value` under `key`, expiring `ttl_secs` seconds from now.
    ///
    /// Expiry is only ever checked when the index is reconstructed from a
    /// sidecar file on open, not on every `get` - an expired-but-not-yet-
    /// reopened entry remains readable until the store is closed and
    /// reopened, or compacted.
    pub fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl_secs: u64) -> Result<()> {
        let expire_time = now_unix().saturating_add(ttl_secs);
        self.put_with_expiry(key, value, expire_time as u32)
    }

    fn put_with_expiry(&self, key: &[u8], value: &[u8], expire_time: u32) -> Result<()> {
        let hash = hash::sum64(key);
        let ciphertext = self.cryptor.encrypt(value)?;
        let timestamp = now_unix();
        let encoded = codec::encode_record(&Record { timestamp, key: key.to_vec(), value: ciphertext });

        let mut state = self.state.write().expect("store lock poisoned");
        state.rotate_if_needed(&self.options, encoded.len() as u64)?;

        let offset = state.write_offset;
        (&*state.active_file).write_all(&encoded)?;
        state.write_offset += encoded.len() as u64;

        state.index.upsert(
            hash,
            Locator {
                file_id: state.active_version,
                size: encoded.len() as u32,
                offset: offset as u32,
                timestamp: timestamp as u32,
                expire_time,
            },
        );
        Ok(())
    }

    /// Returns the current value for `key`, or `None` if it isn't present.
    ///
    /// Re-decodes the on-disk record at the indexed locator and compares
    /// its stored key against `key` before returning the value, so a 64-bit
    /// hash collision surfaces as [`Error::Corruption`] instead of silently
    /// returning the wrong value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hash = hash::sum64(key);

        let (locator, file) = {
            let state = self.state.read().expect("store lock poisoned");
            let Some(locator) = state.index.lookup(hash) else {
                return Ok(None);
            };
            let file = state.registry.handle(locator.file_id).ok_or_else(|| {
                Error::Corruption(format!("no open handle for file id {}", locator.file_id))
            })?;
            (locator, file)
        };

        let mut buf = vec![0u8; locator.size as usize];
        pread(&file, &mut buf, locator.offset as u64)?;
        let record = codec::decode_record(&buf)?;
        if record.key != key {
            return Err(Error::Corruption(format!(
                "hash collision detected for key hash {hash:#x}: stored record's key does not match"
            )));
        }

        Ok(Some(self.cryptor.decrypt(&record.value)?))
    }

    /// Removes `key`. Implemented, like the reference implementation, as an
    /// ordinary append of a zero-length-value record followed by dropping
    /// the key's hash from the in-memory index - there is no dedicated
    /// tombstone marker in the on-disk record format.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let hash = hash::sum64(key);
        let timestamp = now_unix();
        let encoded = codec::encode_record(&Record { timestamp, key: key.to_vec(), value: Vec::new() });

        let mut state = self.state.write().expect("store lock poisoned");
        state.rotate_if_needed(&self.options, encoded.len() as u64)?;
        (&*state.active_file).write_all(&encoded)?;
        state.write_offset += encoded.len() as u64;
        state.index.remove(hash);
        Ok(())
    }

    /// Runs compaction immediately, regardless of the automatic threshold.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state.write().expect("store lock poisoned");
        let State { index, registry, active_version, active_file, write_offset } = &mut *state;
        let result = compact::run(&self.options, &self.cryptor, registry, index)?;
        *active_version = result.active_version;
        *active_file = result.active_file;
        *write_offset = result.write_offset;
        Ok(())
    }

    /// Flushes the active file, writes a fresh sidecar index snapshot, and
    /// drops every open handle.
    pub fn close(self) -> Result<()> {
        let mut state = self.state.into_inner().expect("store lock poisoned");
        state.active_file.sync_all()?;
        persist_sidecar(&self.options, &mut state.registry, &state.index)?;
        Ok(())
    }
}

impl State {
    /// Rotates the active file if appending `incoming_len` more bytes would
    /// push it past `options.data_file_max_size`.
    fn rotate_if_needed(&mut self, options: &Options, incoming_len: u64) -> Result<()> {
        if self.write_offset + incoming_len <= options.data_file_max_size {
            return Ok(());
        }
        self.active_file.sync_all()?;
        self.active_version += 1;
        self.active_file = self.registry.open_active(self.active_version)?;
        self.write_offset = 0;
        log::info!("rotated active file to version {}", self.active_version);
        Ok(())
    }
}

/// Writes a fresh sidecar index file with one 36-byte entry per currently
/// indexed key, in whatever order the index happens to iterate in.
fn persist_sidecar(
    options: &Options,
    registry: &mut Registry,
    index: &Index,
) -> Result<std::path::PathBuf> {
    let _ = options;
    let path = registry.index_path(now_unix());
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;
    for (hash, locator) in index.iter() {
        let entry = IndexEntry {
            key_hash: *hash,
            file_id: locator.file_id,
            timestamp: locator.timestamp,
            expire_time: locator.expire_time,
            size: locator.size,
            offset: locator.offset,
        };
        file.write_all(&codec::encode_index_entry(&entry))?;
    }
    file.sync_all()?;
    Ok(path)
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir) -> Store {
        Store::open(Options::new(dir.path())).unwrap()
    }

    #[test]
    fn open_fresh_creates_layout() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let _store = open(&dir);
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("index").is_dir());
        assert!(dir.path().join("data/1.data").is_file());
        assert_eq!(std::fs::metadata(dir.path().join("data/1.data")).unwrap().len(), 0);
    }

    #[test]
    fn put_get_overwrite_remove() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = open(&dir);

        assert_eq!(store.get(b"foo").unwrap(), None);
        store.put(b"foo", b"bar").unwrap();
        assert_eq!(store.get(b"foo").unwrap(), Some(b"bar".to_vec()));

        store.put(b"foo", b"baz").unwrap();
        assert_eq!(store.get(b"foo").unwrap(), Some(b"baz".to_vec()));

        store.remove(b"foo").unwrap();
        assert_eq!(store.get(b"foo").unwrap(), None);
    }

    #[test]
    fn close_and_reopen_preserves_live_keys() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = open(&dir);
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.remove(b"b").unwrap();
        store.close().unwrap();

        let reopened = Store::open(Options::new(dir.path())).unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(reopened.get(b"b").unwrap(), None);
    }

    #[test]
    fn rotation_keeps_every_key_retrievable() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = Store::open(Options::new(dir.path()).data_file_max_size(128)).unwrap();

        let mut expected = vec![];
        for i in 0..20 {
            let key = format!("key-{i:02}").into_bytes();
            let value = format!("value-{i:02}").into_bytes();
            store.put(&key, &value).unwrap();
            expected.push((key, value));
        }

        let data_files = std::fs::read_dir(dir.path().join("data")).unwrap().count();
        assert!(data_files >= 5, "expected at least 5 data files, found {data_files}");

        for (key, value) in expected {
            assert_eq!(store.get(&key).unwrap(), Some(value));
        }
    }

    #[test]
    fn encryption_round_trip_and_on_disk_opacity() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store =
            Store::open(Options::new(dir.path()).encryption(*b"ME:QQ:2420498526")).unwrap();
        store.put(b"k", b"hello").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"hello".to_vec()));

        let raw = std::fs::read(dir.path().join("data/1.data")).unwrap();
        assert!(
            raw.windows(5).all(|w| w != b"hello"),
            "plaintext value bytes leaked onto disk unencrypted"
        );
    }

    #[test]
    fn corrupted_value_is_detected_on_get() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = open(&dir);
        store.put(b"k", b"hello").unwrap();
        drop(store);

        let path = dir.path().join("data/1.data");
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff; // flip a bit inside the value region
        std::fs::write(&path, raw).unwrap();

        let reopened = Store::open(Options::new(dir.path())).unwrap();
        match reopened.get(b"k") {
            Err(Error::Corruption(_)) => {}
            other => panic!("expected Corruption, got {other:?}"),
        }
    }

    #[test]
    fn compaction_keeps_latest_overwrite_and_reclaims_space() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = Store::open(Options::new(dir.path()).data_file_max_size(256)).unwrap();

        for i in 0..100u32 {
            store.put(b"k", format!("value-{i}").as_bytes()).unwrap();
        }
        store.compact().unwrap();

        assert_eq!(store.get(b"k").unwrap(), Some(b"value-99".to_vec()));

        let data_files: Vec<_> =
            std::fs::read_dir(dir.path().join("data")).unwrap().map(|e| e.unwrap().path()).collect();
        // Only the destination generation should remain; a single small key
        // easily fits in one destination file.
        assert_eq!(data_files.len(), 1);
    }

    #[test]
    fn reopen_after_rotation_reads_keys_from_every_generation() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = Store::open(Options::new(dir.path()).data_file_max_size(128)).unwrap();

        let mut expected = vec![];
        for i in 0..20 {
            let key = format!("key-{i:02}").into_bytes();
            let value = format!("value-{i:02}").into_bytes();
            store.put(&key, &value).unwrap();
            expected.push((key, value));
        }
        store.close().unwrap();

        // Recovery must open read-only handles for every sealed generation
        // referenced by the sidecar, not just the active file.
        let reopened = Store::open(Options::new(dir.path()).data_file_max_size(128)).unwrap();
        for (key, value) in expected {
            assert_eq!(reopened.get(&key).unwrap(), Some(value));
        }
    }

    #[test]
    fn put_with_ttl_is_pruned_by_recovery_after_expiry() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let store = open(&dir);
        store.put_with_ttl(b"k", b"v", 0).unwrap();
        // expire_time == now; recovery treats "<= now" as already expired.
        std::thread::sleep(std::time::Duration::from_secs(1));
        store.close().unwrap();

        let reopened = Store::open(Options::new(dir.path())).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), None);
    }

    proptest::proptest! {
        #[test]
        fn put_then_get_returns_what_was_written(
            key in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..32),
            value in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..128),
        ) {
            let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
            let store = Store::open(Options::new(dir.path())).unwrap();
            store.put(&key, &value).unwrap();
            proptest::prop_assert_eq!(store.get(&key).unwrap(), Some(value));
        }

        #[test]
        fn second_put_wins_over_first(
            key in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..32),
            v1 in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
            v2 in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
        ) {
            let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
            let store = Store::open(Options::new(dir.path())).unwrap();
            store.put(&key, &v1).unwrap();
            store.put(&key, &v2).unwrap();
            proptest::prop_assert_eq!(store.get(&key).unwrap(), Some(v2));
        }

        #[test]
        fn remove_after_put_is_a_miss(
            key in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..32),
            value in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
        ) {
            let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
            let store = Store::open(Options::new(dir.path())).unwrap();
            store.put(&key, &value).unwrap();
            store.remove(&key).unwrap();
            proptest::prop_assert_eq!(store.get(&key).unwrap(), None);
        }
    }
}
