//! Hash helpers for context cookie values.

use sha2::{Digest, Sha256};

use crate::seed::Seed;

/// Length of a hashed cookie value in hex characters.
pub const COOKIE_HASH_LEN: usize = 32;

/// SHA-256 of `data`, hex encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One-way commitment of a raw context value to the current seed:
/// `hash(seed ‖ hash(raw))`, truncated to [`COOKIE_HASH_LEN`] hex chars.
pub fn context_hash(seed: &Seed, raw: &str) -> String {
    let inner = sha256_hex(raw.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(inner.as_bytes());

    let mut out = hex::encode(hasher.finalize());
    out.truncate(COOKIE_HASH_LEN);
    out
}

/// Compare two strings without short-circuiting on the first difference.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
