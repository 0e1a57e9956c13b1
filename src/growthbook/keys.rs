//! # Key Material
//!
//! Encryption and signing keys for SDK connections: 32 bytes from the OS
//! random source, standard base64 with `=`, `+` and `/` removed.

use crate::constants::KEY_MATERIAL_BYTES;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

pub fn generate_key() -> Result<String, rand::Error> {
    let mut bytes = [0u8; KEY_MATERIAL_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(STANDARD
        .encode(bytes)
        .chars()
        .filter(|c| !matches!(c, '=' | '+' | '/'))
        .collect())
}
