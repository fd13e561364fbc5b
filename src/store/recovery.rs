//! Rebuilds in-memory state when a store is opened: prefer the newest
//! sidecar index file, falling back to a full scan of every data file if
//! none exists.

use std::fs;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{self, INDEX_ENTRY_LEN};
use crate::config::{Options, COMPACTION_THRESHOLD_BYTES};
use crate::crypto::Cryptor;
use crate::error::Result;
use crate::index::{Index, Locator};
use crate::registry::Registry;

use super::compact;

pub(super) struct Recovered {
    pub index: Index,
    pub registry: Registry,
    pub active_version: i64,
    pub active_file: Arc<std::fs::File>,
    pub write_offset: u64,
}

pub(super) fn recover(options: &Options, cryptor: &Cryptor) -> Result<Recovered> {
    let mut registry = Registry::new(&options.directory);
    registry.ensure_dirs()?;

    let index = match registry.latest_index_file()? {
        Some(path) => load_from_sidecar(&path)?,
        None => scan_rebuild(&mut registry)?,
    };

    let mut active_version = registry.latest_data_version()?.unwrap_or(1);
    let mut active_file = registry.open_active(active_version)?;
    let mut write_offset = active_file.metadata()?.len();

    if write_offset >= options.data_file_max_size {
        log::info!(
            "newest data file {active_version} is already at or over the rotation threshold, rotating before open"
        );
        active_file.sync_all()?;
        active_version += 1;
        active_file = registry.open_active(active_version)?;
        write_offset = 0;
    }

    for file_id in index.referenced_file_ids() {
        if file_id != active_version {
            registry.open_readable(file_id)?;
        }
    }

    let mut recovered = Recovered { index, registry, active_version, active_file, write_offset };

    if recovered.registry.total_data_bytes()? > COMPACTION_THRESHOLD_BYTES {
        log::info!("data directory exceeds compaction threshold, compacting before opening");
        let result =
            compact::run(options, cryptor, &mut recovered.registry, &mut recovered.index)?;
        recovered.active_version = result.active_version;
        recovered.active_file = result.active_file;
        recovered.write_offset = result.write_offset;
    }

    Ok(recovered)
}

/// Loads a sidecar index file, dropping any entry whose `expire_time` has
/// already passed.
///
/// A truncated trailing entry or a CRC mismatch on an individual entry is
/// logged and skipped rather than aborting the whole load - a partially
/// written sidecar (e.g. from a crash mid-`close`) shouldn't cost every
/// other key its index entry.
fn load_from_sidecar(path: &std::path::Path) -> Result<Index> {
    let bytes = fs::read(path)?;
    let mut index = Index::new();
    let now = now_unix();

    for chunk in bytes.chunks(INDEX_ENTRY_LEN) {
        if chunk.len() != INDEX_ENTRY_LEN {
            log::warn!(
                "sidecar index {} has a truncated trailing entry of {} bytes, skipping",
                path.display(),
                chunk.len()
            );
            continue;
        }
        let entry = match codec::decode_index_entry(chunk) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("skipping corrupt sidecar entry in {}: {err}", path.display());
                continue;
            }
        };
        if entry.expire_time != 0 && (entry.expire_time as u64) <= now {
            continue;
        }
        index.upsert(
            entry.key_hash,
            Locator {
                file_id: entry.file_id,
                size: entry.size,
                offset: entry.offset,
                timestamp: entry.timestamp,
                expire_time: entry.expire_time,
            },
        );
    }
    Ok(index)
}

/// Replays every `*.data` file in version order, record by record, last
/// write wins. A zero-length value means the key was removed.
///
/// There is no sidecar to carry `expire_time` here, so keys written with
/// [`crate::store::Store::put_with_ttl`] are never pruned by a full-scan
/// recovery - an inherited limitation of the on-disk record format, which
/// has no room for expiry.
fn scan_rebuild(registry: &mut Registry) -> Result<Index> {
    let mut index = Index::new();
    for file_id in registry.data_file_ids()? {
        let path = registry.data_path(file_id);
        let bytes = fs::read(&path)?;
        let mut offset = 0usize;
        while offset < bytes.len() {
            if bytes.len() - offset < codec::RECORD_HEADER_LEN {
                break;
            }
            let key_size = u32::from_le_bytes(bytes[offset + 12..offset + 16].try_into().unwrap());
            let value_size = u32::from_le_bytes(bytes[offset + 16..offset + 20].try_into().unwrap());
            let record_len = codec::RECORD_HEADER_LEN + key_size as usize + value_size as usize;
            if bytes.len() - offset < record_len {
                break;
            }
            let record = codec::decode_record(&bytes[offset..offset + record_len])?;
            let hash = crate::hash::sum64(&record.key);
            if record.value.is_empty() {
                index.remove(hash);
            } else {
                index.upsert(
                    hash,
                    Locator {
                        file_id,
                        size: record_len as u32,
                        offset: offset as u32,
                        timestamp: record.timestamp as u32,
                        expire_time: 0,
                    },
                );
            }
            offset += record_len;
        }
    }
    Ok(index)
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}
