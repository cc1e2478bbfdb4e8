//! Process-wide table of active rooms.

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};

use crate::protocol::{DeviceInfo, ServerMessage};

use super::RoomError;
use super::actor::{RoomHandle, spawn_room};
use super::code::{generate_code, normalize_code};

/// How many candidate codes to try before giving up. With 36^6 possible codes
/// a collision streak this long means something is very wrong.
const CODE_RETRY_LIMIT: usize = 16;

/// Maps room codes to live room actors.
///
/// The registry only guards the code table; everything inside a room is
/// serialized by that room's own actor. A code stays bound to its room until
/// the room is empty, so it can never be reallocated out from under members.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an unused code, spawn the room's actor, and register it.
    pub async fn create_room(&self) -> Result<String, RoomError> {
        let mut rooms = self.rooms.write().await;
        for _ in 0..CODE_RETRY_LIMIT {
            let code = generate_code();
            if rooms.contains_key(&code) {
                continue;
            }
            rooms.insert(code.clone(), spawn_room(code.clone()));
            tracing::info!(room = %code, "room created");
            return Ok(code);
        }
        tracing::error!("exhausted {CODE_RETRY_LIMIT} room code candidates");
        Err(RoomError::CodeSpaceExhausted)
    }

    /// Look up a room by raw (un-normalized) code.
    pub async fn get(&self, raw_code: &str) -> Result<RoomHandle, RoomError> {
        let code = normalize_code(raw_code).ok_or(RoomError::InvalidRoomCode)?;
        self.rooms
            .read()
            .await
            .get(&code)
            .cloned()
            .ok_or(RoomError::RoomNotFound)
    }

    /// Join a device into a room.
    ///
    /// Idempotent per stable device id: a rejoin updates the stored info and
    /// outbound channel instead of taking another seat. The registry read
    /// guard is held across the actor call so an empty-room reap cannot
    /// interleave with a join in flight.
    pub async fn join_room(
        &self,
        raw_code: &str,
        device: DeviceInfo,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<(RoomHandle, usize), RoomError> {
        let code = normalize_code(raw_code).ok_or(RoomError::InvalidRoomCode)?;
        let rooms = self.rooms.read().await;
        let handle = rooms.get(&code).cloned().ok_or(RoomError::RoomNotFound)?;
        let count = handle.join(device, outbound).await?;
        Ok((handle, count))
    }

    /// Remove a device from a room, reaping the room once it is empty.
    ///
    /// Returns whether the room was reaped, which is the signal callers use
    /// to drop whatever they retained for it (stored files, for one).
    pub async fn leave_room(&self, raw_code: &str, device_id: &str) -> Result<bool, RoomError> {
        let handle = self.get(raw_code).await?;
        if !handle.leave(device_id).await {
            return Ok(false);
        }

        let mut rooms = self.rooms.write().await;
        // Re-check under the write lock: a join may have raced the leave.
        let still_empty = match rooms.get(handle.code()) {
            Some(current) => current.device_count().await == 0,
            None => false,
        };
        if still_empty {
            rooms.remove(handle.code());
            tracing::info!(room = %handle.code(), "empty room reaped");
        }
        Ok(still_empty)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
