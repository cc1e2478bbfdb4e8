//! Per-room actor.
//!
//! One task per active room owns the device map and every piece of routing
//! addressed to that room. Mutations arrive over the actor's inbox and are
//! handled one at a time, so a capacity check can never race a concurrent
//! join and presence snapshots always reflect a consistent membership.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::protocol::{DeviceInfo, ServerMessage};

use super::RoomError;
use super::lifecycle::{LifecycleSignal, UploadTracker};
use super::presence;

/// Maximum devices per room.
pub const ROOM_CAPACITY: usize = 10;

/// Inbox depth for a room actor.
const INBOX_DEPTH: usize = 64;

/// Fallback display label for devices that report an empty name.
const UNKNOWN_DEVICE: &str = "Unknown Device";

/// One device's seat in a room: its reported info plus the outbound channel
/// its connection drains into the WebSocket.
pub struct Member {
    pub info: DeviceInfo,
    pub outbound: mpsc::Sender<ServerMessage>,
}

/// Commands a room actor accepts over its inbox.
enum RoomMsg {
    Join {
        device: DeviceInfo,
        outbound: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },
    Leave {
        device_id: String,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        message: ServerMessage,
    },
    Lifecycle {
        from_device: String,
        signal: LifecycleSignal,
    },
    Dismiss {
        from_device: String,
        reason: String,
    },
    DeviceCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Cheap, cloneable address of a live room actor.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    code: String,
    tx: mpsc::Sender<RoomMsg>,
}

impl RoomHandle {
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Add a device, or update it if the same stable id is already present
    /// (rejoin after reconnect). Returns the resulting device count.
    pub async fn join(
        &self,
        device: DeviceInfo,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<usize, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RoomMsg::Join {
                device,
                outbound,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::RoomNotFound)?;
        reply_rx.await.map_err(|_| RoomError::RoomNotFound)?
    }

    /// Remove a device. Returns whether the room is now empty.
    pub async fn leave(&self, device_id: &str) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(RoomMsg::Leave {
                device_id: device_id.to_string(),
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            // Actor already gone; nothing left to empty.
            return true;
        }
        reply_rx.await.unwrap_or(true)
    }

    /// Deliver a message to every current member.
    pub async fn broadcast(&self, message: ServerMessage) {
        let _ = self.tx.send(RoomMsg::Broadcast { message }).await;
    }

    /// Forward an upload lifecycle signal to the rest of the room.
    pub async fn relay_lifecycle(&self, from_device: &str, signal: LifecycleSignal) {
        let _ = self
            .tx
            .send(RoomMsg::Lifecycle {
                from_device: from_device.to_string(),
                signal,
            })
            .await;
    }

    /// Turn a receiver's dismissal into cancellations for the devices that
    /// originated the in-flight uploads.
    pub async fn dismiss(&self, from_device: &str, reason: &str) {
        let _ = self
            .tx
            .send(RoomMsg::Dismiss {
                from_device: from_device.to_string(),
                reason: reason.to_string(),
            })
            .await;
    }

    pub async fn device_count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(RoomMsg::DeviceCount { reply: reply_tx })
            .await
            .is_err()
        {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }
}

struct RoomActor {
    code: String,
    members: HashMap<String, Member>,
    uploads: UploadTracker,
}

impl RoomActor {
    fn handle(&mut self, msg: RoomMsg) {
        match msg {
            RoomMsg::Join {
                mut device,
                outbound,
                reply,
            } => {
                let rejoining = self.members.contains_key(&device.id);
                if !rejoining && self.members.len() >= ROOM_CAPACITY {
                    let _ = reply.send(Err(RoomError::RoomFull));
                    return;
                }
                if device.name.trim().is_empty() {
                    device.name = UNKNOWN_DEVICE.to_string();
                }

                tracing::info!(
                    room = %self.code,
                    device = %device.id,
                    name = %device.name,
                    rejoining,
                    "device joined"
                );
                self.members
                    .insert(device.id.clone(), Member { info: device, outbound });
                // The snapshot goes out while the join is still the latest
                // mutation, so the new device sees itself in its first one.
                presence::broadcast_snapshot(&self.code, &self.members);
                let _ = reply.send(Ok(self.members.len()));
            }
            RoomMsg::Leave { device_id, reply } => {
                if self.members.remove(&device_id).is_some() {
                    tracing::info!(room = %self.code, device = %device_id, "device left");
                    self.uploads.drop_device(&device_id);
                    presence::broadcast_snapshot(&self.code, &self.members);
                }
                let _ = reply.send(self.members.is_empty());
            }
            RoomMsg::Broadcast { message } => {
                self.send_to_all(&message, None);
            }
            RoomMsg::Lifecycle {
                from_device,
                signal,
            } => {
                self.uploads.observe(&from_device, &signal);
                let message = signal.to_message(&self.code);
                self.send_to_all(&message, Some(&from_device));
            }
            RoomMsg::Dismiss {
                from_device,
                reason,
            } => {
                for originator in self.uploads.originators() {
                    if originator == from_device {
                        continue;
                    }
                    if let Some(member) = self.members.get(&originator) {
                        tracing::info!(
                            room = %self.code,
                            uploader = %originator,
                            dismissed_by = %from_device,
                            "cancelling in-flight upload"
                        );
                        let _ = member.outbound.try_send(ServerMessage::CancelUpload {
                            reason: reason.clone(),
                        });
                    }
                }
            }
            RoomMsg::DeviceCount { reply } => {
                let _ = reply.send(self.members.len());
            }
        }
    }

    fn send_to_all(&self, message: &ServerMessage, except: Option<&str>) {
        for (id, member) in &self.members {
            if except.is_some_and(|skip| skip == id) {
                continue;
            }
            if member.outbound.try_send(message.clone()).is_err() {
                tracing::warn!(
                    room = %self.code,
                    device = %id,
                    "dropping message for unresponsive device"
                );
            }
        }
    }
}

/// Spawn the actor task for a new room and return its handle.
pub fn spawn_room(code: String) -> RoomHandle {
    let (tx, mut rx) = mpsc::channel(INBOX_DEPTH);
    let handle = RoomHandle {
        code: code.clone(),
        tx,
    };

    tokio::spawn(async move {
        let mut actor = RoomActor {
            code,
            members: HashMap::new(),
            uploads: UploadTracker::default(),
        };
        while let Some(msg) = rx.recv().await {
            actor.handle(msg);
        }
        tracing::debug!(room = %actor.code, "room actor stopped");
    });

    handle
}
