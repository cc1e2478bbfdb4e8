use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of a byte slice.
///
/// Both sides of a transfer use this single primitive: the producer when it
/// builds a manifest, the receiver when it checks a chunk against it.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
