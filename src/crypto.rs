//! Optional value-layer encryption: AES-128-CBC with PKCS#7 padding, or a
//! pass-through identity transform when encryption is disabled.
//!
//! Modeled as a tagged variant rather than a trait object, since there are
//! exactly two modes and neither the teacher crate nor this one has a
//! reason to let callers plug in a third.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{Error, Result};

/// Required length, in bytes, of an AES-128 key.
pub const KEY_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Applies (or doesn't) a value-layer transform before a record is written
/// to the log, and reverses it when the value is read back.
#[derive(Clone)]
pub enum Cryptor {
    /// Values are stored exactly as given.
    None,
    /// Values are AES-128-CBC encrypted with PKCS#7 padding.
    ///
    /// The initialization vector is the key itself, matching the reference
    /// implementation this crate was ported from. That means two records
    /// with identical plaintext values encrypt to identical ciphertext -
    /// there is no semantic security across writes. A per-record random IV
    /// would fix this at the cost of breaking on-disk format compatibility;
    /// this crate keeps the simpler, documented-weaker scheme.
    Aes128Cbc { key: [u8; KEY_LEN] },
}

impl Cryptor {
    /// The identity transform.
    pub fn disabled() -> Self {
        Cryptor::None
    }

    /// AES-128-CBC keyed by `key`, which must be exactly [`KEY_LEN`] bytes.
    pub fn aes128cbc(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(Error::Config(format!(
                "encryption key must be exactly {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let mut fixed = [0u8; KEY_LEN];
        fixed.copy_from_slice(key);
        Ok(Cryptor::Aes128Cbc { key: fixed })
    }

    /// Transforms a plaintext value into what gets written to the log.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Cryptor::None => Ok(plaintext.to_vec()),
            Cryptor::Aes128Cbc { key } => {
                let cipher = Aes128CbcEnc::new(key.into(), key.into());
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
        }
    }

    /// Reverses [`Cryptor::encrypt`], returning the original plaintext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Cryptor::None => Ok(ciphertext.to_vec()),
            Cryptor::Aes128Cbc { key } => {
                let cipher = Aes128CbcDec::new(key.into(), key.into());
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|err| Error::Decryption(format!("PKCS#7 unpadding failed: {err:?}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 16] = b"ME:QQ:2420498526";

    #[test]
    fn disabled_is_identity() {
        let c = Cryptor::disabled();
        let value = b"hello world".to_vec();
        assert_eq!(c.encrypt(&value).unwrap(), value);
        assert_eq!(c.decrypt(&value).unwrap(), value);
    }

    #[test]
    fn aes_round_trip() {
        let c = Cryptor::aes128cbc(KEY).unwrap();
        for plaintext in [&b""[..], b"x", b"hello, world!", &[0u8; 1000]] {
            let ciphertext = c.encrypt(plaintext).unwrap();
            if !plaintext.is_empty() {
                assert_ne!(ciphertext, plaintext);
            }
            assert_eq!(c.decrypt(&ciphertext).unwrap(), plaintext);
        }
    }

    #[test]
    fn aes_rejects_wrong_key_length() {
        assert!(Cryptor::aes128cbc(b"short").is_err());
        assert!(Cryptor::aes128cbc(b"this key is far too long").is_err());
    }

    #[test]
    fn aes_decrypt_rejects_corrupt_ciphertext() {
        let c = Cryptor::aes128cbc(KEY).unwrap();
        let mut ciphertext = c.encrypt(b"hello world").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(c.decrypt(&ciphertext).is_err());
    }
}
