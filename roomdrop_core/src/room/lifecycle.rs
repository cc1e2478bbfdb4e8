//! Upload lifecycle relay.
//!
//! Start/progress/complete signals from an uploading device are forwarded to
//! every other device in its room; a receiver-originated dismissal comes back
//! to the upload's originator as a cancellation. The relay is a deterministic
//! forwarding policy only — deciding *when* to dismiss belongs to the caller.

use std::collections::HashMap;

use crate::protocol::{DeviceInfo, ServerMessage};

/// A lifecycle signal for one in-flight upload, as received from a client.
#[derive(Debug, Clone)]
pub enum LifecycleSignal {
    Start {
        filename: String,
        size: u64,
        device_info: DeviceInfo,
    },
    Progress {
        filename: String,
        progress: f32,
        device_info: DeviceInfo,
    },
    Complete {
        filename: String,
        device_info: DeviceInfo,
        cancelled: Option<bool>,
    },
}

impl LifecycleSignal {
    pub fn filename(&self) -> &str {
        match self {
            LifecycleSignal::Start { filename, .. }
            | LifecycleSignal::Progress { filename, .. }
            | LifecycleSignal::Complete { filename, .. } => filename,
        }
    }

    /// The relayed frame delivered to the other devices in the room.
    pub fn to_message(&self, room_code: &str) -> ServerMessage {
        match self {
            LifecycleSignal::Start {
                filename,
                size,
                device_info,
            } => ServerMessage::UploadStart {
                room_code: room_code.to_string(),
                filename: filename.clone(),
                size: *size,
                device_info: device_info.clone(),
            },
            LifecycleSignal::Progress {
                filename,
                progress,
                device_info,
            } => ServerMessage::UploadProgress {
                room_code: room_code.to_string(),
                filename: filename.clone(),
                progress: *progress,
                device_info: device_info.clone(),
            },
            LifecycleSignal::Complete {
                filename,
                device_info,
                cancelled,
            } => ServerMessage::UploadComplete {
                room_code: room_code.to_string(),
                filename: filename.clone(),
                device_info: device_info.clone(),
                cancelled: *cancelled,
            },
        }
    }
}

/// Tracks which device originated each in-flight upload, by filename.
///
/// Needed to route a dismissal back to the right connection: the dismissing
/// receiver only names the room, never the upload.
#[derive(Debug, Default)]
pub struct UploadTracker {
    active: HashMap<String, String>,
}

impl UploadTracker {
    pub fn observe(&mut self, from_device: &str, signal: &LifecycleSignal) {
        match signal {
            LifecycleSignal::Start { filename, .. }
            | LifecycleSignal::Progress { filename, .. } => {
                self.active
                    .insert(filename.clone(), from_device.to_string());
            }
            LifecycleSignal::Complete { filename, .. } => {
                self.active.remove(filename);
            }
        }
    }

    /// Device ids with at least one upload in flight, deduplicated.
    pub fn originators(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.values().cloned().collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Forget uploads from a device that left the room.
    pub fn drop_device(&mut self, device_id: &str) {
        self.active.retain(|_, origin| origin != device_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
