//! The configuration object that seeds a [`crate::store::Store`]: the data
//! directory, the rotation threshold, and the optional encryption key.
//!
//! Kept decoupled from the engine itself (`Store::open` just takes an
//! `Options` value) so it can be built either programmatically or loaded
//! from a TOML file via the `config` crate, same as the teacher crate loads
//! its own server/client configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::crypto::KEY_LEN;
use crate::error::{Error, Result};

/// Default rotation threshold: 512 MiB.
pub const DEFAULT_DATA_FILE_MAX_SIZE: u64 = 512 * 1024 * 1024;

/// Total on-disk `*.data` bytes at which `Store::open` triggers a
/// compaction pass before doing anything else: 1 GiB.
pub const COMPACTION_THRESHOLD_BYTES: u64 = 1024 * 1024 * 1024;

/// Configuration consumed by [`crate::store::Store::open`].
#[derive(Debug, Clone)]
pub struct Options {
    pub directory: PathBuf,
    pub data_file_max_size: u64,
    pub enable_encryption: bool,
    pub secret: Vec<u8>,
}

impl Options {
    /// Builds options pointing at `directory`, with encryption disabled and
    /// the default rotation threshold.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Options {
            directory: directory.into(),
            data_file_max_size: DEFAULT_DATA_FILE_MAX_SIZE,
            enable_encryption: false,
            secret: Vec::new(),
        }
    }

    /// Overrides the rotation threshold.
    pub fn data_file_max_size(mut self, size: u64) -> Self {
        self.data_file_max_size = size;
        self
    }

    /// Enables AES-128-CBC value encryption with `secret`, which must end
    /// up exactly [`KEY_LEN`] bytes long (checked by [`Options::validate`]).
    pub fn encryption(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.enable_encryption = true;
        self.secret = secret.into();
        self
    }

    /// Loads options from a TOML file with `directory`, `data_file_max_size`
    /// (optional), `enable` (optional), and `secret` (optional) keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Options> {
        let raw: RawOptions = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(|err| Error::Config(err.to_string()))?
            .try_deserialize()
            .map_err(|err| Error::Config(err.to_string()))?;

        let mut opts = Options::new(raw.directory).data_file_max_size(raw.data_file_max_size);
        if raw.enable {
            opts = opts.encryption(raw.secret.into_bytes());
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Validates the directory-non-empty and key-length-exactly-16 rules.
    ///
    /// The original source checked `len(secret) < 16 && len(secret) > 16`,
    /// which is vacuously false; the actual intent, enforced here, is a
    /// plain equality check.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(Error::Config("directory must not be empty".into()));
        }
        if self.data_file_max_size == 0 {
            return Err(Error::Config("data_file_max_size must be greater than zero".into()));
        }
        if self.enable_encryption && self.secret.len() != KEY_LEN {
            return Err(Error::Config(format!(
                "encryption key must be exactly {KEY_LEN} bytes, got {}",
                self.secret.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawOptions {
    directory: PathBuf,
    #[serde(default = "default_max_size")]
    data_file_max_size: u64,
    #[serde(default)]
    enable: bool,
    #[serde(default)]
    secret: String,
}

fn default_max_size() -> u64 {
    DEFAULT_DATA_FILE_MAX_SIZE
}
