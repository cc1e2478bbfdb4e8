//! Receiver-side transfer sessions.
//!
//! A [`SessionSet`] tracks one session per in-flight `file_id` for a single
//! receiving endpoint. A session moves manifest-first: chunks addressed to a
//! `file_id` without an accepted manifest are rejected, every chunk payload is
//! hashed against the manifest before it is stored, and the assembled bytes
//! are only handed out once every slot is filled. Sessions are pure in-memory
//! state; no I/O happens here.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::constants::{MAX_CHUNK_COUNT, MAX_CHUNK_SIZE};
use super::hash::sha256_hex;
use super::manifest::Manifest;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("manifest is missing required fields or malformed")]
    ManifestInvalid,
    #[error("manifest signature does not match its contents")]
    SignatureMismatch,
    #[error("no active transfer session for file {file_id}")]
    NoActiveSession { file_id: String },
    #[error("chunk index {index} outside expected range 0..{chunk_count}")]
    UnexpectedChunkIndex { index: u32, chunk_count: u32 },
    #[error("chunk {index} failed hash verification, transfer discarded")]
    ChunkHashMismatch { index: u32 },
    #[error("transfer incomplete: {received} of {expected} chunks received")]
    IncompleteTransfer { received: usize, expected: usize },
    #[error("unknown transfer {file_id}")]
    UnknownTransfer { file_id: String },
    #[error("chunk payload of {size} bytes exceeds the {MAX_CHUNK_SIZE} byte limit")]
    ChunkTooLarge { size: usize },
    #[error("manifest lists {count} chunks, more than the {MAX_CHUNK_COUNT} allowed")]
    TooManyChunks { count: usize },
}

/// A fully verified, reassembled file ready to hand to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub file_id: String,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Per-file receiving state: the accepted manifest plus one payload slot per
/// chunk. Fill state lives in the slots themselves so duplicate deliveries
/// cannot double-count.
struct TransferSession {
    manifest: Manifest,
    slots: Vec<Option<Bytes>>,
    received: usize,
    last_activity: Instant,
}

impl TransferSession {
    fn new(manifest: Manifest) -> Self {
        let slot_count = manifest.chunk_count();
        Self {
            manifest,
            slots: vec![None; slot_count],
            received: 0,
            last_activity: Instant::now(),
        }
    }

    fn ingest(&mut self, index: u32, payload: &[u8]) -> Result<(), TransferError> {
        let chunk_count = self.manifest.chunk_count() as u32;
        if index >= chunk_count {
            return Err(TransferError::UnexpectedChunkIndex { index, chunk_count });
        }

        let expected = &self.manifest.chunks[index as usize].hash;
        if sha256_hex(payload) != *expected {
            return Err(TransferError::ChunkHashMismatch { index });
        }

        let slot = &mut self.slots[index as usize];
        if slot.is_none() {
            self.received += 1;
        }
        // Duplicate delivery overwrites in place; the payload is identical
        // anyway since it hashed to the same digest.
        *slot = Some(Bytes::copy_from_slice(payload));
        self.last_activity = Instant::now();
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.received == self.manifest.chunk_count()
    }

    fn assemble(self) -> CompletedFile {
        let mut buf = BytesMut::with_capacity(self.manifest.total_size as usize);
        for slot in &self.slots {
            if let Some(payload) = slot {
                buf.extend_from_slice(payload);
            }
        }
        CompletedFile {
            file_id: self.manifest.file_id,
            filename: self.manifest.filename,
            mime_type: self.manifest.mime_type,
            bytes: buf.freeze(),
        }
    }
}

/// All in-flight sessions for one receiving endpoint, keyed by `file_id`.
///
/// Sessions for different files are independent; callers needing cross-task
/// access wrap the set in their own exclusive lock.
#[derive(Default)]
pub struct SessionSet {
    sessions: HashMap<String, TransferSession>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a manifest and open a session for its `file_id`.
    ///
    /// Structural validation runs before the signature is recomputed. A
    /// manifest for a `file_id` that is already receiving replaces the old
    /// session: last manifest wins, previously buffered chunks are dropped.
    pub fn accept_manifest(
        &mut self,
        manifest: Manifest,
        signature: &str,
    ) -> Result<(), TransferError> {
        if !manifest.is_structurally_valid() {
            return Err(TransferError::ManifestInvalid);
        }
        if manifest.chunk_count() > MAX_CHUNK_COUNT {
            return Err(TransferError::TooManyChunks {
                count: manifest.chunk_count(),
            });
        }
        if !manifest.verify(signature) {
            return Err(TransferError::SignatureMismatch);
        }

        let file_id = manifest.file_id.clone();
        if self.sessions.contains_key(&file_id) {
            tracing::debug!(file_id = %file_id, "superseding transfer session");
        }
        self.sessions.insert(file_id, TransferSession::new(manifest));
        Ok(())
    }

    /// Ingest one chunk for an open session.
    ///
    /// A hash mismatch discards the whole session: once a single chunk fails
    /// verification the stream's identity can no longer be trusted, so the
    /// transfer is not salvageable by retrying.
    pub fn ingest_chunk(
        &mut self,
        file_id: &str,
        index: u32,
        payload: &[u8],
    ) -> Result<(), TransferError> {
        if payload.len() > MAX_CHUNK_SIZE {
            return Err(TransferError::ChunkTooLarge {
                size: payload.len(),
            });
        }

        let session = match self.sessions.get_mut(file_id) {
            Some(s) => s,
            None => {
                return Err(TransferError::NoActiveSession {
                    file_id: file_id.to_string(),
                });
            }
        };

        match session.ingest(index, payload) {
            Err(err @ TransferError::ChunkHashMismatch { .. }) => {
                self.sessions.remove(file_id);
                tracing::warn!(file_id = %file_id, %err, "discarding transfer session");
                Err(err)
            }
            other => other,
        }
    }

    /// Assemble the file once every chunk has been verified.
    ///
    /// An incomplete session is left open: late chunks may still arrive and a
    /// later finalize can succeed. Only idle reaping or a superseding
    /// manifest discards it.
    pub fn finalize(&mut self, file_id: &str) -> Result<CompletedFile, TransferError> {
        let (received, expected, complete) = match self.sessions.get(file_id) {
            Some(s) => (s.received, s.manifest.chunk_count(), s.is_complete()),
            None => {
                return Err(TransferError::UnknownTransfer {
                    file_id: file_id.to_string(),
                });
            }
        };
        if !complete {
            return Err(TransferError::IncompleteTransfer { received, expected });
        }

        match self.sessions.remove(file_id) {
            Some(session) => Ok(session.assemble()),
            None => Err(TransferError::UnknownTransfer {
                file_id: file_id.to_string(),
            }),
        }
    }

    /// Drop sessions idle past `max_idle`. Returns how many were discarded.
    pub fn reap_idle(&mut self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| s.last_activity.elapsed() < max_idle);
        let reaped = before - self.sessions.len();
        if reaped > 0 {
            tracing::info!(reaped, "reaped idle transfer sessions");
        }
        reaped
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.sessions.contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::producer::ChunkPlan;

    fn plan_for(content: &[u8], chunk_size: usize) -> ChunkPlan {
        ChunkPlan::new(
            "file-1",
            "sample.bin",
            "application/octet-stream",
            Bytes::copy_from_slice(content),
            chunk_size,
        )
    }

    fn accept(set: &mut SessionSet, plan: &ChunkPlan) {
        set.accept_manifest(plan.manifest().clone(), plan.signature())
            .unwrap();
    }

    fn ingest_all(set: &mut SessionSet, plan: &ChunkPlan) {
        for record in &plan.manifest().chunks {
            let payload = plan.chunk_payload(record.index).unwrap();
            set.ingest_chunk("file-1", record.index, &payload).unwrap();
        }
    }

    #[test]
    fn round_trip_single_chunk() {
        let content = b"tiny".to_vec();
        let plan = plan_for(&content, 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        ingest_all(&mut set, &plan);
        let done = set.finalize("file-1").unwrap();
        assert_eq!(done.bytes.as_ref(), content.as_slice());
        assert_eq!(done.filename, "sample.bin");
        assert!(set.is_empty());
    }

    #[test]
    fn round_trip_two_chunks() {
        let content = vec![0x5A; 100];
        let plan = plan_for(&content, 64);
        assert_eq!(plan.manifest().chunk_count(), 2);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        ingest_all(&mut set, &plan);
        assert_eq!(set.finalize("file-1").unwrap().bytes.as_ref(), &content[..]);
    }

    #[test]
    fn round_trip_hundred_chunks() {
        let content: Vec<u8> = (0..1600).map(|i| (i % 251) as u8).collect();
        let plan = plan_for(&content, 16);
        assert_eq!(plan.manifest().chunk_count(), 100);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        ingest_all(&mut set, &plan);
        assert_eq!(set.finalize("file-1").unwrap().bytes.as_ref(), &content[..]);
    }

    #[test]
    fn reverse_order_delivery_still_finalizes() {
        let content: Vec<u8> = (0..=255).collect();
        let plan = plan_for(&content, 32);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        for record in plan.manifest().chunks.iter().rev() {
            let payload = plan.chunk_payload(record.index).unwrap();
            set.ingest_chunk("file-1", record.index, &payload).unwrap();
        }
        assert_eq!(set.finalize("file-1").unwrap().bytes.as_ref(), &content[..]);
    }

    #[test]
    fn interleaved_transfers_are_independent() {
        let content_a: Vec<u8> = vec![1; 96];
        let content_b: Vec<u8> = vec![2; 96];
        let plan_a = ChunkPlan::new("file-a", "a.bin", "application/octet-stream",
            Bytes::from(content_a.clone()), 32);
        let plan_b = ChunkPlan::new("file-b", "b.bin", "application/octet-stream",
            Bytes::from(content_b.clone()), 32);

        let mut set = SessionSet::new();
        set.accept_manifest(plan_a.manifest().clone(), plan_a.signature()).unwrap();
        set.accept_manifest(plan_b.manifest().clone(), plan_b.signature()).unwrap();

        for index in 0..3u32 {
            set.ingest_chunk("file-a", index, &plan_a.chunk_payload(index).unwrap()).unwrap();
            set.ingest_chunk("file-b", index, &plan_b.chunk_payload(index).unwrap()).unwrap();
        }

        assert_eq!(set.finalize("file-b").unwrap().bytes.as_ref(), &content_b[..]);
        assert_eq!(set.finalize("file-a").unwrap().bytes.as_ref(), &content_a[..]);
    }

    #[test]
    fn single_bit_flip_discards_session() {
        let content = vec![0xFF; 128];
        let plan = plan_for(&content, 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);

        let mut tampered = plan.chunk_payload(0).unwrap().to_vec();
        tampered[17] ^= 0x01;
        let err = set.ingest_chunk("file-1", 0, &tampered).unwrap_err();
        assert_eq!(err, TransferError::ChunkHashMismatch { index: 0 });
        assert!(!set.contains("file-1"));

        // The session is gone, so even a valid chunk is now unaddressed.
        let err = set
            .ingest_chunk("file-1", 1, &plan.chunk_payload(1).unwrap())
            .unwrap_err();
        assert!(matches!(err, TransferError::NoActiveSession { .. }));
    }

    #[test]
    fn signature_gate_rejects_mutated_manifest() {
        let plan = plan_for(&[7u8; 100], 64);
        let signature = plan.signature().to_string();
        let mut manifest = plan.manifest().clone();
        manifest.total_size += 1;

        let mut set = SessionSet::new();
        let err = set.accept_manifest(manifest, &signature).unwrap_err();
        assert_eq!(err, TransferError::SignatureMismatch);
        assert!(set.is_empty());
    }

    #[test]
    fn structurally_broken_manifest_rejected_before_signature() {
        let plan = plan_for(&[7u8; 100], 64);
        let mut manifest = plan.manifest().clone();
        manifest.file_id.clear();
        let mut set = SessionSet::new();
        let err = set.accept_manifest(manifest, plan.signature()).unwrap_err();
        assert_eq!(err, TransferError::ManifestInvalid);
    }

    #[test]
    fn chunk_before_manifest_is_no_active_session() {
        let mut set = SessionSet::new();
        let err = set.ingest_chunk("ghost", 0, b"payload").unwrap_err();
        assert_eq!(
            err,
            TransferError::NoActiveSession {
                file_id: "ghost".to_string()
            }
        );
    }

    #[test]
    fn out_of_range_index_rejected_without_discarding() {
        let plan = plan_for(&[1u8; 64], 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        let err = set.ingest_chunk("file-1", 5, b"whatever").unwrap_err();
        assert_eq!(
            err,
            TransferError::UnexpectedChunkIndex {
                index: 5,
                chunk_count: 1
            }
        );
        assert!(set.contains("file-1"));
    }

    #[test]
    fn duplicate_chunk_does_not_double_count() {
        let content = vec![3u8; 128];
        let plan = plan_for(&content, 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);

        let first = plan.chunk_payload(0).unwrap();
        set.ingest_chunk("file-1", 0, &first).unwrap();
        set.ingest_chunk("file-1", 0, &first).unwrap();

        // Still one chunk missing; the duplicate must not have counted twice.
        let err = set.finalize("file-1").unwrap_err();
        assert_eq!(
            err,
            TransferError::IncompleteTransfer {
                received: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn failed_finalize_leaves_session_usable() {
        let content = vec![9u8; 128];
        let plan = plan_for(&content, 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        set.ingest_chunk("file-1", 0, &plan.chunk_payload(0).unwrap()).unwrap();

        assert!(matches!(
            set.finalize("file-1"),
            Err(TransferError::IncompleteTransfer { received: 1, expected: 2 })
        ));

        // The missing chunk arrives late; finalize now succeeds.
        set.ingest_chunk("file-1", 1, &plan.chunk_payload(1).unwrap()).unwrap();
        assert_eq!(set.finalize("file-1").unwrap().bytes.as_ref(), &content[..]);
    }

    #[test]
    fn finalize_unknown_transfer() {
        let mut set = SessionSet::new();
        assert!(matches!(
            set.finalize("nope"),
            Err(TransferError::UnknownTransfer { .. })
        ));
    }

    #[test]
    fn new_manifest_supersedes_old_session() {
        let plan_old = plan_for(&[1u8; 128], 64);
        let plan_new = plan_for(&[2u8; 64], 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan_old);
        set.ingest_chunk("file-1", 0, &plan_old.chunk_payload(0).unwrap()).unwrap();

        accept(&mut set, &plan_new);
        // Old progress is gone; one chunk completes the new layout.
        set.ingest_chunk("file-1", 0, &plan_new.chunk_payload(0).unwrap()).unwrap();
        assert_eq!(set.finalize("file-1").unwrap().bytes.as_ref(), &[2u8; 64][..]);
    }

    #[test]
    fn oversized_chunk_rejected() {
        let plan = plan_for(&[1u8; 64], 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        let big = vec![0u8; MAX_CHUNK_SIZE + 1];
        assert!(matches!(
            set.ingest_chunk("file-1", 0, &big),
            Err(TransferError::ChunkTooLarge { .. })
        ));
    }

    #[test]
    fn reap_idle_discards_stale_sessions() {
        let plan = plan_for(&[1u8; 64], 64);
        let mut set = SessionSet::new();
        accept(&mut set, &plan);
        assert_eq!(set.reap_idle(Duration::from_secs(300)), 0);
        assert_eq!(set.reap_idle(Duration::ZERO), 1);
        assert!(set.is_empty());
    }
}
