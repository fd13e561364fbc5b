//! The error taxonomy returned by every fallible operation in this crate.
//!
//! Mirrors the shape of the teacher crate's own `error` module: one flat
//! enum, manual `Display`, a couple of `From` conversions, and a crate-wide
//! `Result` alias so call sites read `-> Result<T>` instead of
//! `-> std::result::Result<T, Error>`.

use std::fmt;

/// Every way a `caskdb` operation can fail.
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration: empty directory, wrong-length encryption key.
    Config(String),
    /// An underlying filesystem failure.
    Io(std::io::Error),
    /// A CRC mismatch, a size inconsistency, or a detected hash collision.
    Corruption(String),
    /// AES-CBC encryption failed.
    Encryption(String),
    /// AES-CBC decryption or PKCS#7 unpadding failed.
    Decryption(String),
    /// A `marshal` helper failed to serialize or deserialize a value.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Corruption(msg) => write!(f, "corruption detected: {msg}"),
            Error::Encryption(msg) => write!(f, "encryption error: {msg}"),
            Error::Decryption(msg) => write!(f, "decryption error: {msg}"),
            Error::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Builds an `Error::Corruption` with a formatted message.
#[macro_export]
macro_rules! errcorrupt {
    ($($args:tt)*) => { $crate::error::Error::Corruption(format!($($args)*)) };
}

/// Builds an `Error::Config` with a formatted message.
#[macro_export]
macro_rules! errconfig {
    ($($args:tt)*) => { $crate::error::Error::Config(format!($($args)*)) };
}
