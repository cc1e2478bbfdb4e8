//! Request/response surface.
//!
//! Thin JSON handlers around the registry and the store: room create/info,
//! upload into a room, list, download, delete. The transfer protocol itself
//! runs over the WebSocket; these endpoints only move whole verified payloads
//! in and out.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::room::RoomError;
use crate::store::{StoredFile, format_size, sanitize_filename};
use crate::transfer::constants::MAX_FILE_SIZE;

use super::state::AppState;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error shape shared by every handler: a status code plus a human-readable
/// message in a JSON body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        let status = match err {
            RoomError::RoomNotFound => StatusCode::NOT_FOUND,
            RoomError::RoomFull => StatusCode::CONFLICT,
            RoomError::InvalidRoomCode => StatusCode::BAD_REQUEST,
            RoomError::CodeSpaceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct RoomCreatedResponse {
    pub success: bool,
    pub room_code: String,
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoomCreatedResponse>, ApiError> {
    let room_code = state.rooms.create_room().await?;
    Ok(Json(RoomCreatedResponse {
        success: true,
        room_code,
    }))
}

#[derive(Debug, Serialize)]
pub struct RoomInfoResponse {
    pub room_code: String,
    pub device_count: usize,
    pub file_count: usize,
}

pub async fn room_info(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<RoomInfoResponse>, ApiError> {
    let room = state.rooms.get(&code).await?;
    Ok(Json(RoomInfoResponse {
        room_code: room.code().to_string(),
        device_count: room.device_count().await,
        file_count: state.store.count_room(room.code()).await,
    }))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub filename: String,
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let room = state.rooms.get(&code).await?;

    let mut device_info = "Unknown Device".to_string();
    let mut file: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("device_info") => {
                device_info = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed upload: {e}")))?;
            }
            Some("file") => {
                let filename = sanitize_filename(field.file_name().unwrap_or_default());
                let mime_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Malformed upload: {e}")))?;
                file = Some((filename, mime_type, bytes));
            }
            _ => {}
        }
    }

    let (filename, mime_type, bytes) = file.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Empty file"));
    }
    if bytes.len() as u64 > MAX_FILE_SIZE {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File exceeds the {} limit", format_size(MAX_FILE_SIZE)),
        ));
    }

    let stored = state
        .store
        .insert(room.code(), &filename, &mime_type, &device_info, bytes)
        .await;
    room.broadcast(stored.availability_message()).await;

    Ok(Json(UploadResponse {
        success: true,
        file_id: stored.file_id,
        filename: stored.filename,
    }))
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub file_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub size_display: String,
    pub device_info: String,
    pub uploaded_at: u64,
    pub chunks: usize,
}

impl From<StoredFile> for FileEntry {
    fn from(f: StoredFile) -> Self {
        Self {
            file_id: f.file_id,
            filename: f.filename,
            mime_type: f.mime_type,
            size: f.size,
            size_display: format_size(f.size),
            device_info: f.device_info,
            uploaded_at: f.uploaded_at,
            chunks: f.manifest.chunk_count(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileEntry>,
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<FileListResponse>, ApiError> {
    let room = state.rooms.get(&code).await?;
    let files = state
        .store
        .list_room(room.code())
        .await
        .into_iter()
        .map(FileEntry::from)
        .collect();
    Ok(Json(FileListResponse { files }))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let stored = state
        .store
        .get(&file_id)
        .await
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    // Header values must be visible ASCII; anything else becomes '_'.
    let header_name: String = stored
        .filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() || c == ' ') && c != '"' {
                c
            } else {
                '_'
            }
        })
        .collect();

    Response::builder()
        .header(header::CONTENT_TYPE, stored.mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{header_name}\""),
        )
        .header(header::CONTENT_LENGTH, stored.size)
        .body(Body::from(stored.content))
        .map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Response build failed: {e}"),
            )
        })
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub device_info: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let stored = state
        .store
        .remove(&file_id)
        .await
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    // Tell the room, if it is still alive.
    if let Ok(room) = state.rooms.get(&stored.room_code).await {
        room.broadcast(crate::protocol::ServerMessage::FileDeleted {
            file_id: stored.file_id,
            filename: stored.filename,
            device_info: params
                .device_info
                .unwrap_or_else(|| "Unknown Device".to_string()),
        })
        .await;
    }

    Ok(Json(DeleteResponse { success: true }))
}
