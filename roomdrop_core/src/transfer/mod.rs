//! Manifest-and-chunk transfer pipeline.
//!
//! This module provides:
//! - SHA-256 content hashing shared by both sides
//! - Manifest construction, signing and verification
//! - Receiver-side sessions that verify and reassemble chunk streams
//! - Sender-side chunk planning and emission

pub mod constants;
pub mod hash;
pub mod manifest;
pub mod producer;
pub mod session;

// Re-export public API
pub use constants::{CHUNK_SIZE, MAX_CHUNK_SIZE, MAX_FILE_SIZE, SESSION_IDLE_TIMEOUT_SECS};
pub use manifest::{ChunkRecord, Manifest};
pub use producer::{ChunkPlan, decode_chunk_payload, stream_file};
pub use session::{CompletedFile, SessionSet, TransferError};
