//! Field-level encryption for personal attributes.
//!
//! Every encrypted column holds `base64(nonce || AES-256-GCM ciphertext)`.
//! Columns that must support equality lookup or a uniqueness constraint also
//! carry an index token: a keyed SHA-256 digest of the exact plaintext.
//! Callers normalise a value first when its lookups should be looser.
//! The index key and the encryption key are both derived from one master key,
//! so a single `FIELD_ENCRYPTION_KEY` drives the whole scheme.

pub mod password;

use std::str::FromStr;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const ENCRYPTION_KEY_CONTEXT: &[u8] = b"clinic-be/field-encryption/v1";
const INDEX_KEY_CONTEXT: &[u8] = b"clinic-be/field-index/v1";

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid field encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    #[error("invalid ciphertext format")]
    InvalidFormat,

    #[error("decrypted value could not be parsed: {0}")]
    InvalidPlaintext(String),
}

/// Capability interface for opaque-at-rest values.
///
/// Implementations encrypt on write, decrypt on read, and project a
/// deterministic index token for searchable fields.
pub trait FieldCipher: Send + Sync {
    fn encrypt_bytes(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError>;

    fn decrypt_bytes(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Deterministic lookup token. Equal plaintexts give equal tokens.
    fn index_token(&self, plain: &str) -> String;

    fn encrypt(&self, plain: &str) -> Result<String, CipherError> {
        Ok(STANDARD.encode(self.encrypt_bytes(plain.as_bytes())?))
    }

    fn decrypt(&self, stored: &str) -> Result<String, CipherError> {
        let sealed = STANDARD
            .decode(stored)
            .map_err(|_| CipherError::InvalidFormat)?;
        let plain = self.decrypt_bytes(&sealed)?;
        String::from_utf8(plain).map_err(|e| CipherError::InvalidPlaintext(e.to_string()))
    }
}

impl<'a> dyn FieldCipher + 'a {
    pub fn encrypt_value<T: ToString>(&self, value: &T) -> Result<String, CipherError> {
        self.encrypt(&value.to_string())
    }

    pub fn decrypt_value<T>(&self, stored: &str) -> Result<T, CipherError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let plain = self.decrypt(stored)?;
        plain
            .parse::<T>()
            .map_err(|e| CipherError::InvalidPlaintext(e.to_string()))
    }

    pub fn encrypt_opt(&self, value: Option<&str>) -> Result<Option<String>, CipherError> {
        value.map(|v| self.encrypt(v)).transpose()
    }

    pub fn decrypt_opt(&self, stored: Option<&str>) -> Result<Option<String>, CipherError> {
        stored.map(|v| self.decrypt(v)).transpose()
    }
}

/// AES-256-GCM field cipher with keyed SHA-256 index tokens.
pub struct AesFieldCipher {
    cipher: Aes256Gcm,
    index_key: Zeroizing<[u8; 32]>,
}

impl AesFieldCipher {
    pub fn new(master_key: &[u8; 32]) -> Self {
        let encryption_key = derive_subkey(master_key, ENCRYPTION_KEY_CONTEXT);
        let index_key = derive_subkey(master_key, INDEX_KEY_CONTEXT);
        Self {
            cipher: Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(
                encryption_key.as_slice(),
            )),
            index_key,
        }
    }

    /// Build a cipher from a 64 character hex master key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CipherError> {
        let bytes = Zeroizing::new(
            hex::decode(key_hex.trim()).map_err(|e| CipherError::InvalidKey(e.to_string()))?,
        );
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            CipherError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        let key = Zeroizing::new(key);
        Ok(Self::new(&key))
    }

    /// Fresh random master key, hex encoded. Used by tests and first-run setups.
    pub fn generate_key_hex() -> String {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut_slice());
        hex::encode(key.as_slice())
    }
}

impl FieldCipher for AesFieldCipher {
    fn encrypt_bytes(&self, plain: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plain)
            .map_err(|_| CipherError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt_bytes(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_LEN {
            return Err(CipherError::InvalidFormat);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Decryption)
    }

    fn index_token(&self, plain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index_key.as_slice());
        hasher.update([0u8]);
        hasher.update(plain.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for AesFieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesFieldCipher").finish_non_exhaustive()
    }
}

fn derive_subkey(master_key: &[u8; 32], context: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(context);
    hasher.update(master_key);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&hasher.finalize());
    key
}
