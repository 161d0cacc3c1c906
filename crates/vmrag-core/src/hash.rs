//! Content hashing.

use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 encoding of `content`, as 64 lowercase hex characters.
///
/// Pure, total, deterministic: the single contract the rest of the system
/// leans on to decide whether a document changed.
pub fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)
}
