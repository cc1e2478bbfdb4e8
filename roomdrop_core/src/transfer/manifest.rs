//! Manifest construction, signing and verification.
//!
//! A manifest describes a file's chunk layout: per-chunk SHA-256 hashes plus
//! enough geometry (offset, size) to slice the original bytes back out. The
//! signature is a digest over a deterministic rendering of the manifest so a
//! receiver can reject a chunk list that was corrupted in transit before it
//! commits any session state. There is no secret key involved; this detects
//! corruption, it does not authenticate the server.

use serde::{Deserialize, Serialize};

use super::hash::sha256_hex;

/// One contiguous, indexed slice of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub index: u32,
    pub offset: u64,
    pub size: u32,
    /// Hex SHA-256 of the chunk payload
    pub hash: String,
}

/// Immutable descriptor of a file's chunk layout, issued once per transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub file_id: String,
    pub filename: String,
    pub mime_type: String,
    pub chunk_size: u32,
    pub total_size: u64,
    pub chunks: Vec<ChunkRecord>,
}

impl Manifest {
    /// Split `content` into fixed-size chunks and hash each one.
    ///
    /// Indices are assigned in emission order, contiguous from 0. An empty
    /// input produces a manifest with zero chunks.
    pub fn build(
        file_id: &str,
        filename: &str,
        mime_type: &str,
        content: &[u8],
        chunk_size: usize,
    ) -> Self {
        let step = chunk_size.max(1);
        let mut chunks = Vec::with_capacity(content.len().div_ceil(step));
        for (index, piece) in content.chunks(step).enumerate() {
            chunks.push(ChunkRecord {
                index: index as u32,
                offset: (index * step) as u64,
                size: piece.len() as u32,
                hash: sha256_hex(piece),
            });
        }

        Self {
            file_id: file_id.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            chunk_size: step as u32,
            total_size: content.len() as u64,
            chunks,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Structural sanity: non-empty identity, contiguous indices from 0, and
    /// chunk geometry that adds back up to `total_size`.
    pub fn is_structurally_valid(&self) -> bool {
        if self.file_id.is_empty() {
            return false;
        }
        if self.chunks.is_empty() {
            return self.total_size == 0;
        }

        let mut expected_offset: u64 = 0;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if chunk.index as usize != i || chunk.offset != expected_offset || chunk.hash.is_empty()
            {
                return false;
            }
            expected_offset += chunk.size as u64;
        }
        expected_offset == self.total_size
    }

    /// Compute the manifest signature.
    ///
    /// The rendering is a predictable string rather than serialized JSON so
    /// that any client can reproduce it without worrying about field order:
    /// `file_id:total_size:chunk_count:hash0|hash1|...`
    pub fn sign(&self) -> String {
        let chunk_hashes = self
            .chunks
            .iter()
            .map(|c| c.hash.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let payload = format!(
            "{}:{}:{}:{}",
            self.file_id,
            self.total_size,
            self.chunks.len(),
            chunk_hashes
        );
        sha256_hex(payload.as_bytes())
    }

    /// Check a received signature against this manifest's contents.
    ///
    /// Fails closed: a structurally broken manifest is rejected before the
    /// signature is even recomputed.
    pub fn verify(&self, signature: &str) -> bool {
        self.is_structurally_valid() && self.sign() == signature
    }
}
