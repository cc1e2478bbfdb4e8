//! Room membership and session coordination.
//!
//! Each active room is an independent actor task owning its device set; all
//! joins, leaves and broadcasts for a room are serialized through the actor's
//! inbox, so capacity checks and presence snapshots can never race. The
//! registry maps codes to live room handles.

pub mod actor;
pub mod code;
pub mod lifecycle;
pub mod presence;
pub mod registry;

use thiserror::Error;

// Re-export public API
pub use actor::{ROOM_CAPACITY, RoomHandle};
pub use code::{ROOM_CODE_LEN, normalize_code};
pub use lifecycle::LifecycleSignal;
pub use registry::RoomRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Could not allocate an unused room code")]
    CodeSpaceExhausted,
    #[error("Room code must be 6 letters or digits")]
    InvalidRoomCode,
}
