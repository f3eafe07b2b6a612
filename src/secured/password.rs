//! Password hashing for account credentials.
//!
//! Stored passwords are Argon2id PHC strings. A value that already carries the
//! `$argon2id$` marker is treated as hashed and stored untouched; anything else
//! is hashed before it reaches the store.

use aes_gcm::aead::OsRng;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const HASH_MARKER: &str = "$argon2id$";

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

pub fn is_hashed(value: &str) -> bool {
    value.starts_with(HASH_MARKER)
}

pub fn make_password(raw: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError(e.to_string()))
}

/// Hash `value` unless it already looks hashed.
pub fn ensure_hashed(value: String) -> Result<String, PasswordError> {
    if value.is_empty() || is_hashed(&value) {
        return Ok(value);
    }
    make_password(&value)
}

pub fn check_password(raw: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(raw.as_bytes(), &parsed)
        .is_ok()
}
