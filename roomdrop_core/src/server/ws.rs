//! WebSocket connection handler.
//!
//! Each connection gets one task running a single select loop: inbound frames
//! are decoded into the [`ClientMessage`] union and dispatched, room-originated
//! traffic drains from the connection's outbound channel, and a periodic ping
//! keeps mobile browsers from silently dropping the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{ClientMessage, DeviceInfo, ServerMessage};
use crate::room::RoomError;
use crate::room::actor::RoomHandle;
use crate::room::code::normalize_code;
use crate::room::lifecycle::LifecycleSignal;
use crate::transfer::producer::{ChunkPlan, stream_file};

use super::state::AppState;

/// Ping interval for keeping the WebSocket connection alive (5 seconds)
const PING_INTERVAL_SECS: u64 = 5;

/// Outbound queue depth per connection; a device that cannot drain this many
/// frames is considered unresponsive and starts losing room traffic.
const OUTBOUND_DEPTH: usize = 256;

const REASON_DISMISSED: &str = "Receiving was dismissed on the other devices";

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let client_ip = addr.ip().to_string();
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_ip))
}

/// Per-connection state carried across dispatches.
struct Connection {
    state: Arc<AppState>,
    outbound: mpsc::Sender<ServerMessage>,
    room: Option<RoomHandle>,
    device_id: Option<String>,
    /// Cancels chunk streams spawned for this connection
    streams: CancellationToken,
}

/// Handle one WebSocket connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_ip: String) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_DEPTH);

    tracing::info!(from = %client_ip, "WebSocket connection established");

    let mut conn = Connection {
        state,
        outbound: outbound_tx,
        room: None,
        device_id: None,
        streams: CancellationToken::new(),
    };

    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(bytes::Bytes::new())).await.is_err() {
                    break;
                }
            }
            queued = outbound_rx.recv() => {
                match queued {
                    Some(msg) => {
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = receiver.next() => {
                match handle_inbound(&mut conn, &mut sender, inbound).await {
                    Flow::Continue => {}
                    Flow::Close => break,
                }
            }
        }
    }

    conn.teardown().await;
    tracing::info!(from = %client_ip, "WebSocket connection closed");
}

enum Flow {
    Continue,
    Close,
}

async fn handle_inbound(
    conn: &mut Connection,
    sender: &mut SplitSink<WebSocket, Message>,
    inbound: Option<Result<Message, axum::Error>>,
) -> Flow {
    match inbound {
        Some(Ok(Message::Text(text))) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    if let Some(reply) = conn.dispatch(msg).await {
                        if !send_json(sender, &reply).await {
                            return Flow::Close;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("undecodable frame: {e}");
                    let reply = ServerMessage::RoomError {
                        error: "Unrecognized message".to_string(),
                    };
                    if !send_json(sender, &reply).await {
                        return Flow::Close;
                    }
                }
            }
            Flow::Continue
        }
        Some(Ok(Message::Close(_))) | None => Flow::Close,
        Some(Err(e)) => {
            tracing::debug!("WebSocket error: {e}");
            Flow::Close
        }
        // Binary frames, pings and pongs carry nothing for us
        _ => Flow::Continue,
    }
}

impl Connection {
    /// Dispatch one decoded frame. The returned message, if any, is the
    /// direct reply sent back on the same channel that carried the request.
    async fn dispatch(&mut self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::JoinRoom {
                room_code,
                device_info,
            } => Some(self.join_room(&room_code, device_info).await),
            ClientMessage::LeaveRoom { .. } => {
                self.leave_current_room().await;
                None
            }
            ClientMessage::RequestFile { file_id } => self.request_file(&file_id).await,
            ClientMessage::UploadStart {
                filename,
                size,
                device_info,
                ..
            } => {
                self.relay(LifecycleSignal::Start {
                    filename,
                    size,
                    device_info,
                })
                .await
            }
            ClientMessage::UploadProgress {
                filename,
                progress,
                device_info,
                ..
            } => {
                self.relay(LifecycleSignal::Progress {
                    filename,
                    progress,
                    device_info,
                })
                .await
            }
            ClientMessage::UploadComplete {
                filename,
                device_info,
                cancelled,
                ..
            } => {
                self.relay(LifecycleSignal::Complete {
                    filename,
                    device_info,
                    cancelled,
                })
                .await
            }
            ClientMessage::DismissReceiving { .. } => self.dismiss().await,
        }
    }

    async fn join_room(&mut self, room_code: &str, device_info: DeviceInfo) -> ServerMessage {
        let Some(code) = normalize_code(room_code) else {
            return ServerMessage::RoomError {
                error: RoomError::InvalidRoomCode.to_string(),
            };
        };

        // Switching rooms implies leaving the old one first; rejoining the
        // same room must not, or a solo device would reap its own room.
        let rejoining_same = self
            .room
            .as_ref()
            .is_some_and(|room| room.code() == code);
        if !rejoining_same {
            self.leave_current_room().await;
        }

        let device_id = device_info.id.clone();
        match self
            .state
            .rooms
            .join_room(&code, device_info, self.outbound.clone())
            .await
        {
            Ok((handle, device_count)) => {
                // Catch the newcomer up on files already shared into the room.
                let files = self.state.store.list_room(handle.code()).await;
                let file_count = files.len();
                for stored in files {
                    let _ = self.outbound.try_send(stored.availability_message());
                }

                let code = handle.code().to_string();
                self.room = Some(handle);
                self.device_id = Some(device_id);
                ServerMessage::RoomJoined {
                    room_code: code,
                    file_count,
                    device_count,
                }
            }
            Err(e) => ServerMessage::RoomError {
                error: e.to_string(),
            },
        }
    }

    async fn leave_current_room(&mut self) {
        // Chunks already in flight to this device are no longer wanted.
        self.streams.cancel();
        self.streams = CancellationToken::new();

        if let (Some(room), Some(device_id)) = (self.room.take(), self.device_id.take()) {
            match self.state.rooms.leave_room(room.code(), &device_id).await {
                Ok(true) => {
                    // Last device out: the room's files go with it.
                    let dropped = self.state.store.clear_room(room.code()).await;
                    if dropped > 0 {
                        tracing::info!(
                            room = %room.code(),
                            dropped,
                            "cleared files of reaped room"
                        );
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::debug!(room = %room.code(), "leave failed: {e}"),
            }
        }
    }

    async fn request_file(&mut self, file_id: &str) -> Option<ServerMessage> {
        let room = match &self.room {
            Some(room) => room,
            None => {
                return Some(ServerMessage::FileError {
                    error: "Join a room first".to_string(),
                });
            }
        };

        let stored = match self.state.store.get(file_id).await {
            // Files are only addressable from inside their own room.
            Some(f) if f.room_code == room.code() => f,
            _ => {
                return Some(ServerMessage::FileError {
                    error: "File not found".to_string(),
                });
            }
        };

        let plan = ChunkPlan::from_parts(
            stored.manifest,
            stored.manifest_signature,
            stored.content,
        );
        let outbound = self.outbound.clone();
        let cancel = self.streams.child_token();
        tokio::spawn(async move {
            stream_file(&plan, &outbound, &cancel).await;
        });
        None
    }

    async fn relay(&mut self, signal: LifecycleSignal) -> Option<ServerMessage> {
        match (&self.room, &self.device_id) {
            (Some(room), Some(device_id)) => {
                room.relay_lifecycle(device_id, signal).await;
                None
            }
            _ => Some(ServerMessage::RoomError {
                error: "Join a room first".to_string(),
            }),
        }
    }

    async fn dismiss(&mut self) -> Option<ServerMessage> {
        // Stop chunk streams still addressed to this device, then ask the
        // room to cancel the uploads in flight.
        self.streams.cancel();
        self.streams = CancellationToken::new();

        match (&self.room, &self.device_id) {
            (Some(room), Some(device_id)) => {
                room.dismiss(device_id, REASON_DISMISSED).await;
                None
            }
            _ => Some(ServerMessage::RoomError {
                error: "Join a room first".to_string(),
            }),
        }
    }

    async fn teardown(&mut self) {
        self.leave_current_room().await;
    }
}

/// Serialize and send one frame. Returns whether the socket is still usable.
async fn send_json(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => sender.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("failed to encode server message: {e}");
            true
        }
    }
}
