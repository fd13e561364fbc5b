//! Reclaims space occupied by overwritten and removed keys by rewriting
//! every live record into fresh data files and dropping everything else.
//!
//! Ordering matters for crash safety: the new sidecar index is persisted
//! *before* any old data file is deleted, so a crash mid-compaction leaves
//! either the old files plus the old sidecar, or the old files plus the
//! new sidecar - both of which recovery can make sense of. The original
//! source deleted old files by a broken pairwise-inequality check that
//! could leave live files behind or, worse, attempt to delete files still
//! referenced by the index; here the excluded set is tracked explicitly by
//! file id before anything is rewritten.

use std::io::Write as _;
use std::sync::Arc;

use crate::codec;
use crate::config::Options;
use crate::crypto::Cryptor;
use crate::error::Result;
use crate::index::{Index, Locator};
use crate::registry::{pread, Registry};

pub(super) struct CompactResult {
    pub active_version: i64,
    pub active_file: Arc<std::fs::File>,
    pub write_offset: u64,
}

pub(super) fn run(
    options: &Options,
    cryptor: &Cryptor,
    registry: &mut Registry,
    index: &mut Index,
) -> Result<CompactResult> {
    let excluded_files: std::collections::HashSet<i64> =
        registry.data_file_ids()?.into_iter().collect();
    let mut dest_version = excluded_files.iter().copied().max().unwrap_or(0) + 1;
    let mut dest_file = registry.open_active(dest_version)?;
    let mut dest_offset: u64 = 0;
    let destination_versions_start = dest_version;

    for hash in index.hashes() {
        let Some(locator) = index.lookup(hash) else { continue };
        let source = registry.open_readable(locator.file_id)?;
        let mut raw = vec![0u8; locator.size as usize];
        pread(&source, &mut raw, locator.offset as u64)?;
        let record = codec::decode_record(&raw)?;

        // Round-trip the value through the Cryptor rather than copying the
        // ciphertext bytes verbatim. Under the static-IV scheme this is a
        // no-op, but it keeps compaction correct if the Cryptor is ever
        // swapped for a scheme where re-encrypting doesn't reproduce the
        // same bytes (e.g. a per-record random IV).
        let plaintext = cryptor.decrypt(&record.value)?;
        let ciphertext = cryptor.encrypt(&plaintext)?;
        let encoded =
            codec::encode_record(&codec::Record { timestamp: record.timestamp, key: record.key, value: ciphertext });

        // Backward-looking, unlike the Writer's rotation check: the
        // destination file's size *before* this record is compared against
        // the threshold, matching the source's migrate loop rather than
        // the Writer's "would this record push us over" formula.
        if dest_offset >= options.data_file_max_size {
            dest_file.sync_all()?;
            dest_version += 1;
            dest_file = registry.open_active(dest_version)?;
            dest_offset = 0;
        }

        (&*dest_file).write_all(&encoded)?;
        index.upsert(
            hash,
            Locator {
                file_id: dest_version,
                size: encoded.len() as u32,
                offset: dest_offset as u32,
                timestamp: locator.timestamp,
                expire_time: locator.expire_time,
            },
        );
        dest_offset += encoded.len() as u64;
    }
    dest_file.sync_all()?;

    super::persist_sidecar(options, registry, index)?;

    for file_id in excluded_files {
        if file_id >= destination_versions_start {
            continue;
        }
        registry.close(file_id);
        let path = registry.data_path(file_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }

    let newest_index = registry.latest_index_file()?;
    for entry in std::fs::read_dir(registry.index_dir())? {
        let path = entry?.path();
        if newest_index.as_deref() != Some(path.as_path()) {
            std::fs::remove_file(&path)?;
        }
    }

    Ok(CompactResult { active_version: dest_version, active_file: dest_file, write_offset: dest_offset })
}
