//! In-memory file store.
//!
//! Uploaded files live in process memory only, scoped to the room they were
//! shared into, with their manifest and signature precomputed at insert time.
//! Nothing here touches disk; dropping the room (or the process) drops the
//! bytes.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::ServerMessage;
use crate::transfer::constants::{CHUNK_SIZE, MAX_FILENAME_LENGTH};
use crate::transfer::manifest::Manifest;

/// One uploaded file held for relay within a room.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub file_id: String,
    pub room_code: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    /// Display label of the uploading device
    pub device_info: String,
    /// Unix timestamp (seconds) of the upload
    pub uploaded_at: u64,
    pub content: Bytes,
    pub manifest: Manifest,
    pub manifest_signature: String,
}

impl StoredFile {
    /// The broadcast frame announcing this file to the room.
    pub fn availability_message(&self) -> ServerMessage {
        ServerMessage::FileAvailable {
            file_id: self.file_id.clone(),
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            size_display: format_size(self.size),
            device_info: self.device_info.clone(),
            chunks: self.manifest.chunk_count(),
            uploaded_at: self.uploaded_at,
        }
    }
}

/// All stored files, keyed by server-generated file id.
///
/// Lookups go through ids the server minted itself, so a peer can never coerce
/// a read outside the store.
#[derive(Default)]
pub struct FileStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file and precompute its manifest and signature.
    pub async fn insert(
        &self,
        room_code: &str,
        filename: &str,
        mime_type: &str,
        device_info: &str,
        content: Bytes,
    ) -> StoredFile {
        let file_id = Uuid::new_v4().to_string();
        let manifest = Manifest::build(&file_id, filename, mime_type, &content, CHUNK_SIZE);
        let manifest_signature = manifest.sign();
        let uploaded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let stored = StoredFile {
            file_id: file_id.clone(),
            room_code: room_code.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: content.len() as u64,
            device_info: device_info.to_string(),
            uploaded_at,
            content,
            manifest,
            manifest_signature,
        };

        self.files.write().await.insert(file_id, stored.clone());
        tracing::info!(
            room = %room_code,
            file = %stored.file_id,
            filename = %stored.filename,
            size = stored.size,
            "file stored"
        );
        stored
    }

    pub async fn get(&self, file_id: &str) -> Option<StoredFile> {
        self.files.read().await.get(file_id).cloned()
    }

    pub async fn remove(&self, file_id: &str) -> Option<StoredFile> {
        self.files.write().await.remove(file_id)
    }

    /// Files shared into one room, newest first.
    pub async fn list_room(&self, room_code: &str) -> Vec<StoredFile> {
        let files = self.files.read().await;
        let mut listed: Vec<StoredFile> = files
            .values()
            .filter(|f| f.room_code == room_code)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        listed
    }

    pub async fn count_room(&self, room_code: &str) -> usize {
        self.files
            .read()
            .await
            .values()
            .filter(|f| f.room_code == room_code)
            .count()
    }

    /// Drop every file belonging to a room. Returns how many were removed.
    pub async fn clear_room(&self, room_code: &str) -> usize {
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|_, f| f.room_code != room_code);
        before - files.len()
    }
}

/// Format a byte count for humans.
pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} TB")
}

/// Strip path components and control characters from a client filename.
///
/// Only the final component survives, so neither traversal sequences nor
/// absolute paths can describe anything outside a flat display name.
pub fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .split(['/', '\\'])
        .next_back()
        .unwrap_or_default()
        .trim();

    let mut clean: String = name.chars().filter(|c| !c.is_control()).collect();

    if clean.is_empty() || clean == "." || clean == ".." {
        return "unnamed_file".to_string();
    }

    if clean.len() > MAX_FILENAME_LENGTH {
        let mut cutoff = MAX_FILENAME_LENGTH;
        while !clean.is_char_boundary(cutoff) {
            cutoff -= 1;
        }
        clean.truncate(cutoff);
    }

    clean
}
