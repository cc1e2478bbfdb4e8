//! Wire protocol for the relay channel.
//!
//! Every frame on the WebSocket is one JSON object from a closed tagged
//! union, discriminated by a `type` field. Clients speak [`ClientMessage`],
//! the server answers with [`ServerMessage`]. Unknown tags fail decoding and
//! are reported back instead of being silently dropped.

use serde::{Deserialize, Serialize};

use crate::transfer::manifest::Manifest;

/// A device participating in a room.
///
/// `id` is a stable, client-generated identity that survives reconnects;
/// `name` is a self-reported display label, `platform` a coarse OS hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub platform: String,
}

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a room, announcing the device behind this connection
    JoinRoom {
        room_code: String,
        device_info: DeviceInfo,
    },
    /// Exit the current room
    LeaveRoom { room_code: String },
    /// Ask the server to stream a stored file as manifest + chunks
    RequestFile { file_id: String },
    /// Announce an upload starting on this device
    UploadStart {
        room_code: String,
        filename: String,
        size: u64,
        device_info: DeviceInfo,
    },
    /// Periodic upload progress, as a percentage
    UploadProgress {
        room_code: String,
        filename: String,
        progress: f32,
        device_info: DeviceInfo,
    },
    /// Upload finished (or was aborted when `cancelled` is set)
    UploadComplete {
        room_code: String,
        filename: String,
        device_info: DeviceInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancelled: Option<bool>,
    },
    /// Receiver no longer wants in-flight uploads for this room
    DismissReceiving { room_code: String },
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join acknowledged
    RoomJoined {
        room_code: String,
        file_count: usize,
        device_count: usize,
    },
    /// Join/leave failure
    RoomError { error: String },
    /// Full presence snapshot after every membership change
    DevicesUpdated { devices: Vec<DeviceInfo> },
    /// A file was uploaded and can now be requested
    FileAvailable {
        file_id: String,
        filename: String,
        mime_type: String,
        size: u64,
        size_display: String,
        device_info: String,
        chunks: usize,
        uploaded_at: u64,
    },
    /// Transfer begins: the chunk layout and its signature
    FileManifest {
        file_id: String,
        filename: String,
        mime_type: String,
        size: u64,
        manifest: Manifest,
        manifest_signature: String,
    },
    /// One chunk, base64-encoded, addressed by index
    FileChunk {
        file_id: String,
        chunk_index: u32,
        content: String,
    },
    /// All chunks for the file have been emitted
    FileTransferComplete { file_id: String },
    /// Transfer or store failure
    FileError { error: String },
    /// A stored file was removed
    FileDeleted {
        file_id: String,
        filename: String,
        device_info: String,
    },
    /// Relayed from another device in the room
    UploadStart {
        room_code: String,
        filename: String,
        size: u64,
        device_info: DeviceInfo,
    },
    /// Relayed from another device in the room
    UploadProgress {
        room_code: String,
        filename: String,
        progress: f32,
        device_info: DeviceInfo,
    },
    /// Relayed from another device in the room
    UploadComplete {
        room_code: String,
        filename: String,
        device_info: DeviceInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancelled: Option<bool>,
    },
    /// Abort an in-flight upload, delivered to its originator only
    CancelUpload { reason: String },
}
