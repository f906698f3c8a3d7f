//! Credential material: bearer tokens, their hashes, and OTP codes.
//!
//! Only [`hash_token`] output is ever persisted; the raw token leaves this process
//! exactly once, in the response that issues it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::domain::types::OTP_LENGTH;

/// Raw token entropy in bytes.
pub const TOKEN_BYTES: usize = 32;

/// Hash a bearer token into its storage lookup key (lowercase hex SHA-256).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a 256-bit random token encoded as base64url (43 characters).
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Uniformly random numeric OTP code of [`OTP_LENGTH`] digits, leading zeros kept.
pub fn generate_otp_code() -> String {
    let mut rng = rand::rng();
    (0..OTP_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}
