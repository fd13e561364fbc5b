#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

//! An embedded, single-process, append-only key-value store.
//!
//! A [`Store`] keeps an in-memory hash index over one or more append-only
//! log files. Writes always go to the current active file; reads consult
//! the index for a file id and byte offset, then read the record straight
//! off disk with a positional read. Every record and sidecar index entry
//! carries its own CRC32, checked before any other field in it is trusted.
//!
//! ```no_run
//! use caskdb::{Options, Store};
//!
//! let store = Store::open(Options::new("/tmp/caskdb-example"))?;
//! store.put(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?, Some(b"world".to_vec()));
//! store.close()?;
//! # Ok::<(), caskdb::Error>(())
//! ```

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod index;
pub mod logging;
pub mod marshal;
pub mod registry;
pub mod store;

pub use config::Options;
pub use error::{Error, Result};
pub use store::Store;
