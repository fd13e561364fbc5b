//! Helpers for marshalling arbitrary Rust values to and from the byte
//! payload stored in a record's value field.
//!
//! This sits outside the core storage engine on purpose: `Store` only ever
//! sees `&[u8]`/`Vec<u8>`. Callers who want typed values can reach for these
//! instead of hand-rolling their own encoding.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Serializes `value` to the byte payload a [`crate::store::Store`] put
/// expects.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|err| Error::Serialization(err.to_string()))
}

/// Deserializes a byte payload previously produced by [`encode_value`].
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|err| Error::Serialization(err.to_string()))
}
