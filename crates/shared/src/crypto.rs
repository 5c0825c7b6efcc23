//! Cryptographic utilities for API key generation and hashing.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts a short, privacy-preserving prefix from an opaque API key, used
/// as an admission-control identifier when no authenticated user id is
/// available. Returns `None` if the key is shorter than `len`.
pub fn extract_key_prefix(key: &str, len: usize) -> Option<&str> {
    key.is_char_boundary(len).then(|| &key[..len])
}
