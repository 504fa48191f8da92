//! Content fingerprints.

use sha2::{Digest, Sha256};

/// SHA-256 of `bytes`, lowercase hex. Used as the dedup and change-detection key.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
