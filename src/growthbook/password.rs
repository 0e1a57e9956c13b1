//! # Password Hashing
//!
//! GrowthBook stores passwords as `<salt>:<key>`: `salt` is 16 random bytes
//! in hex, `key` the hex of a 64 byte scrypt key (N=16384, r=8, p=1)
//! derived from the password with the salt's hex text as KDF salt.

use crate::constants::{PASSWORD_HASH_BYTES, PASSWORD_SALT_BYTES, SCRYPT_LOG_N, SCRYPT_P, SCRYPT_R};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid scrypt parameters: {0}")]
    Params(String),
    #[error("failed to draw salt: {0}")]
    Random(#[from] rand::Error),
}

/// Hash `password`, reusing the salt of `existing_hash` when it has one so
/// an unchanged password produces an unchanged hash
pub fn hash_password(password: &str, existing_hash: &str) -> Result<String, PasswordError> {
    let salt = match existing_hash.split_once(':') {
        Some((salt, _)) if !salt.is_empty() => salt.to_string(),
        _ => generate_salt()?,
    };
    derive(password, &salt)
}

fn generate_salt() -> Result<String, PasswordError> {
    let mut salt = [0u8; PASSWORD_SALT_BYTES];
    OsRng.try_fill_bytes(&mut salt)?;
    Ok(hex::encode(salt))
}

fn derive(password: &str, salt: &str) -> Result<String, PasswordError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, PASSWORD_HASH_BYTES)
        .map_err(|e| PasswordError::Params(e.to_string()))?;
    let mut key = [0u8; PASSWORD_HASH_BYTES];
    scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut key)
        .map_err(|e| PasswordError::Params(e.to_string()))?;
    Ok(format!("{salt}:{}", hex::encode(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_SALT: &str = "00112233445566778899aabbccddeeff";
    const KNOWN_HASH: &str = "00112233445566778899aabbccddeeff:3e19ebeabf15ad17c24de695284e79441c0d80c6d98b95a3c052c58a0d57b09f83b0742a5805af28a0b5bbcf673af62819b91eb830a104fb0bb42def767f52aa";

    #[test]
    fn test_matches_reference_vector() {
        let hash = hash_password("correct horse", &format!("{KNOWN_SALT}:")).unwrap();
        assert_eq!(hash, KNOWN_HASH);
    }

    #[test]
    fn test_fresh_hash_format() {
        let hash = hash_password("secret", "").unwrap();
        let (salt, key) = hash.split_once(':').unwrap();
        assert_eq!(hash.len(), 161);
        assert_eq!(salt.len(), 32);
        assert_eq!(key.len(), 128);
        assert!(hash.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_existing_salt_makes_hash_stable() {
        let first = hash_password("secret", "").unwrap();
        let second = hash_password("secret", &first).unwrap();
        assert_eq!(first, second);

        let changed = hash_password("other", &first).unwrap();
        assert_ne!(first, changed);
        assert_eq!(first.split_once(':').unwrap().0, changed.split_once(':').unwrap().0);
    }

    #[test]
    fn test_empty_salt_segment_draws_new_salt() {
        let hash = hash_password("secret", ":deadbeef").unwrap();
        assert_eq!(hash.split_once(':').unwrap().0.len(), 32);
    }
}
