//! Directory conventions, file naming, and the open-handle table shared by
//! every component that needs to read or write a `*.data` or `*.index`
//! file.
//!
//! Read paths never reopen a data file per call: every handle reachable
//! through a [`crate::index::Locator`] is cached here, keyed by file id, so
//! concurrent readers share one `Arc<File>` and use positional reads
//! instead of contending on a shared cursor.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

const DATA_SUFFIX: &str = "data";
const INDEX_SUFFIX: &str = "index";

/// Unix file mode applied to created data and index files.
#[cfg(unix)]
const FILE_MODE: u32 = 0o750;

/// Owns the data/index directory paths and the table of file handles open
/// for reading, keyed by file id (data file version).
pub struct Registry {
    data_dir: PathBuf,
    index_dir: PathBuf,
    handles: HashMap<i64, Arc<File>>,
}

impl Registry {
    /// Builds a registry rooted at `root` (not yet created on disk).
    pub fn new(root: &Path) -> Self {
        Registry { data_dir: root.join("data"), index_dir: root.join("index"), handles: HashMap::new() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Creates the `data/` and `index/` subdirectories if they don't exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.index_dir)?;
        Ok(())
    }

    pub fn data_path(&self, version: i64) -> PathBuf {
        self.data_dir.join(format!("{version}.{DATA_SUFFIX}"))
    }

    pub fn index_path(&self, unix_seconds: u64) -> PathBuf {
        self.index_dir.join(format!("{unix_seconds}.{INDEX_SUFFIX}"))
    }

    /// Opens (creating if needed) the data file for `version` for reading
    /// and appending, takes an exclusive advisory lock on it, registers it,
    /// and returns a shared handle to it.
    ///
    /// The lock is held for as long as the handle stays open and is
    /// released automatically when the last `Arc<File>` is dropped; a
    /// second process trying to open the same directory as active fails
    /// fast here instead of silently interleaving writes with this one.
    pub fn open_active(&mut self, version: i64) -> Result<Arc<File>> {
        use fs4::FileExt;

        let path = self.data_path(version);
        let mut opts = OpenOptions::new();
        opts.read(true).append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(FILE_MODE);
        }
        let file = opts.open(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            crate::error::Error::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                format!("{} is locked by another process", path.display()),
            ))
        })?;
        let file = Arc::new(file);
        self.handles.insert(version, Arc::clone(&file));
        Ok(file)
    }

    /// Returns the read-only handle for `file_id`, opening and registering
    /// it if it isn't already open.
    pub fn open_readable(&mut self, file_id: i64) -> Result<Arc<File>> {
        if let Some(file) = self.handles.get(&file_id) {
            return Ok(Arc::clone(file));
        }
        let path = self.data_path(file_id);
        let file = Arc::new(OpenOptions::new().read(true).open(&path)?);
        self.handles.insert(file_id, Arc::clone(&file));
        Ok(file)
    }

    /// Looks up an already-open handle without opening anything.
    pub fn handle(&self, file_id: i64) -> Option<Arc<File>> {
        self.handles.get(&file_id).cloned()
    }

    /// Drops the cached handle for `file_id`, if any.
    pub fn close(&mut self, file_id: i64) {
        self.handles.remove(&file_id);
    }

    /// The largest version number among `*.data` files on disk, or `None`
    /// if there are none.
    pub fn latest_data_version(&self) -> Result<Option<i64>> {
        let mut max = None;
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if has_extension(&path, DATA_SUFFIX) {
                if let Some(version) = stem_as_i64(&path) {
                    max = Some(max.map_or(version, |m: i64| m.max(version)));
                }
            }
        }
        Ok(max)
    }

    /// The `*.index` file with the largest numeric stem, or `None` if there
    /// are none.
    pub fn latest_index_file(&self) -> Result<Option<PathBuf>> {
        let mut newest: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(&self.index_dir)? {
            let path = entry?.path();
            if !has_extension(&path, INDEX_SUFFIX) {
                continue;
            }
            if let Some(ts) = stem_as_u64(&path) {
                if newest.as_ref().map_or(true, |(best, _)| ts > *best) {
                    newest = Some((ts, path));
                }
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    /// All `*.data` file ids currently on disk, ascending.
    pub fn data_file_ids(&self) -> Result<Vec<i64>> {
        let mut ids = vec![];
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if has_extension(&path, DATA_SUFFIX) {
                if let Some(v) = stem_as_i64(&path) {
                    ids.push(v);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Sum of the sizes of every `*.data` file on disk.
    pub fn total_data_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if has_extension(&entry.path(), DATA_SUFFIX) {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn stem_as_i64(path: &Path) -> Option<i64> {
    path.file_stem()?.to_str()?.parse::<i64>().ok()
}

fn stem_as_u64(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse::<u64>().ok()
}

/// Reads exactly `buf.len()` bytes from `file` starting at `offset`,
/// without disturbing any other reader's position on the same handle.
#[cfg(unix)]
pub fn pread(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

/// Windows equivalent of [`pread`] using `seek_read`, looping until the
/// buffer is filled since a single call may return short.
#[cfg(windows)]
pub fn pread(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut total = 0;
    while total < buf.len() {
        let n = file.seek_read(&mut buf[total..], offset + total as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short positional read"));
        }
        total += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn latest_data_version_picks_max_stem() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let reg = Registry::new(dir.path());
        reg.ensure_dirs().unwrap();
        for v in [1, 2, 10, 3] {
            File::create(reg.data_path(v)).unwrap();
        }
        assert_eq!(reg.latest_data_version().unwrap(), Some(10));
    }

    #[test]
    fn latest_data_version_empty_is_none() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let reg = Registry::new(dir.path());
        reg.ensure_dirs().unwrap();
        assert_eq!(reg.latest_data_version().unwrap(), None);
    }

    #[test]
    fn latest_index_file_picks_max_stem() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let reg = Registry::new(dir.path());
        reg.ensure_dirs().unwrap();
        for ts in [100u64, 300, 200] {
            File::create(reg.index_path(ts)).unwrap();
        }
        assert_eq!(reg.latest_index_file().unwrap(), Some(reg.index_path(300)));
    }

    #[test]
    fn pread_reads_at_offset_independent_of_cursor() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let path = dir.path().join("1.data");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"0123456789").unwrap();
        drop(file);

        let file = File::open(&path).unwrap();
        let mut buf = [0u8; 4];
        pread(&file, &mut buf, 3).unwrap();
        assert_eq!(&buf, b"3456");
        // Reading again at a different offset must not depend on the first read.
        pread(&file, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"0123");
    }

    #[test]
    fn open_active_reuses_registered_handle() {
        let dir = tempfile::TempDir::with_prefix("caskdb").unwrap();
        let mut reg = Registry::new(dir.path());
        reg.ensure_dirs().unwrap();
        reg.open_active(1).unwrap();
        assert!(reg.handle(1).is_some());
        assert!(reg.handle(2).is_none());
    }
}
