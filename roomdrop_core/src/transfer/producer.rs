//! Sender-side chunk production.
//!
//! A [`ChunkPlan`] freezes a file into its wire form once: manifest,
//! signature, and the slice geometry for every chunk. Emission is
//! fire-and-forget in strict index order; the producer never waits for
//! per-chunk acknowledgement, reliability is the transport's job and
//! verification the receiver's.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::ServerMessage;

use super::manifest::Manifest;

/// Precomputed emission plan for one file.
pub struct ChunkPlan {
    manifest: Manifest,
    signature: String,
    content: Bytes,
}

impl ChunkPlan {
    /// Slice and hash `content`, producing the manifest and its signature.
    pub fn new(
        file_id: &str,
        filename: &str,
        mime_type: &str,
        content: Bytes,
        chunk_size: usize,
    ) -> Self {
        let manifest = Manifest::build(file_id, filename, mime_type, &content, chunk_size);
        let signature = manifest.sign();
        Self {
            manifest,
            signature,
            content,
        }
    }

    /// Rebuild a plan from a manifest computed earlier (e.g. at upload time).
    pub fn from_parts(manifest: Manifest, signature: String, content: Bytes) -> Self {
        Self {
            manifest,
            signature,
            content,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Raw payload bytes for one chunk, by index.
    pub fn chunk_payload(&self, index: u32) -> Option<Bytes> {
        let record = self.manifest.chunks.get(index as usize)?;
        let start = record.offset as usize;
        let end = start + record.size as usize;
        if end > self.content.len() {
            return None;
        }
        Some(self.content.slice(start..end))
    }

    /// The manifest frame that opens the transfer.
    pub fn manifest_message(&self) -> ServerMessage {
        ServerMessage::FileManifest {
            file_id: self.manifest.file_id.clone(),
            filename: self.manifest.filename.clone(),
            mime_type: self.manifest.mime_type.clone(),
            size: self.manifest.total_size,
            manifest: self.manifest.clone(),
            manifest_signature: self.signature.clone(),
        }
    }

    /// One chunk frame, payload base64-encoded for the JSON channel.
    pub fn chunk_message(&self, index: u32) -> Option<ServerMessage> {
        let payload = self.chunk_payload(index)?;
        Some(ServerMessage::FileChunk {
            file_id: self.manifest.file_id.clone(),
            chunk_index: index,
            content: BASE64.encode(&payload),
        })
    }

    /// The completion frame that closes the transfer.
    pub fn complete_message(&self) -> ServerMessage {
        ServerMessage::FileTransferComplete {
            file_id: self.manifest.file_id.clone(),
        }
    }

    /// Full wire sequence: manifest, chunks in index order, completion.
    pub fn messages(&self) -> impl Iterator<Item = ServerMessage> + '_ {
        std::iter::once(self.manifest_message())
            .chain(
                self.manifest
                    .chunks
                    .iter()
                    .filter_map(|record| self.chunk_message(record.index)),
            )
            .chain(std::iter::once(self.complete_message()))
    }
}

/// Decode a chunk frame's base64 payload back into raw bytes.
pub fn decode_chunk_payload(content: &str) -> Option<Vec<u8>> {
    BASE64.decode(content).ok()
}

/// Stream a plan into a receiver's outbound channel.
///
/// Emits the manifest, then every chunk in index order, then the completion
/// signal. Stops between chunks once `cancel` fires or the receiver is gone;
/// chunks already handed to the channel may still be delivered, which the
/// receiver side tolerates. Returns whether the full sequence was emitted.
pub async fn stream_file(
    plan: &ChunkPlan,
    outbound: &mpsc::Sender<ServerMessage>,
    cancel: &CancellationToken,
) -> bool {
    if outbound.send(plan.manifest_message()).await.is_err() {
        return false;
    }

    for record in &plan.manifest().chunks {
        if cancel.is_cancelled() {
            tracing::info!(
                file_id = %plan.manifest().file_id,
                chunk_index = record.index,
                "chunk stream cancelled"
            );
            return false;
        }
        let Some(message) = plan.chunk_message(record.index) else {
            return false;
        };
        if outbound.send(message).await.is_err() {
            return false;
        }
    }

    outbound.send(plan.complete_message()).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::constants::CHUNK_SIZE;

    fn plan_for(content: &[u8]) -> ChunkPlan {
        ChunkPlan::new(
            "file-1",
            "data.bin",
            "application/octet-stream",
            Bytes::copy_from_slice(content),
            8,
        )
    }

    #[test]
    fn messages_emit_manifest_first_and_complete_last() {
        let plan = plan_for(&[0u8; 20]);
        let messages: Vec<_> = plan.messages().collect();
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[0], ServerMessage::FileManifest { .. }));
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::FileTransferComplete { .. })
        ));
        for (i, msg) in messages[1..4].iter().enumerate() {
            match msg {
                ServerMessage::FileChunk { chunk_index, .. } => {
                    assert_eq!(*chunk_index, i as u32)
                }
                other => panic!("expected chunk, got {:?}", other),
            }
        }
    }

    #[test]
    fn chunk_payload_round_trips_through_base64() {
        let content: Vec<u8> = (0..=255).collect();
        let plan = ChunkPlan::new(
            "file-1",
            "data.bin",
            "application/octet-stream",
            Bytes::from(content.clone()),
            CHUNK_SIZE,
        );
        match plan.chunk_message(0) {
            Some(ServerMessage::FileChunk { content: encoded, .. }) => {
                assert_eq!(decode_chunk_payload(&encoded).unwrap(), content);
            }
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn payload_out_of_range_is_none() {
        let plan = plan_for(&[1u8; 8]);
        assert!(plan.chunk_payload(1).is_none());
        assert!(plan.chunk_message(1).is_none());
    }

    #[tokio::test]
    async fn stream_delivers_full_sequence() {
        let plan = plan_for(&[7u8; 24]);
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        assert!(stream_file(&plan, &tx, &cancel).await);
        drop(tx);

        let mut kinds = Vec::new();
        while let Some(msg) = rx.recv().await {
            kinds.push(msg);
        }
        assert_eq!(kinds.len(), 5);
        assert!(matches!(kinds[0], ServerMessage::FileManifest { .. }));
        assert!(matches!(kinds[4], ServerMessage::FileTransferComplete { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_emission_between_chunks() {
        let plan = plan_for(&[7u8; 80]); // 10 chunks
        let (tx, mut rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!stream_file(&plan, &tx, &cancel).await);
        drop(tx);

        // Manifest goes out before the first cancellation check; no chunks do.
        let mut received = Vec::new();
        while let Some(msg) = rx.recv().await {
            received.push(msg);
        }
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], ServerMessage::FileManifest { .. }));
    }

    #[tokio::test]
    async fn dropped_receiver_halts_stream() {
        let plan = plan_for(&[7u8; 80]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        assert!(!stream_file(&plan, &tx, &cancel).await);
    }
}
