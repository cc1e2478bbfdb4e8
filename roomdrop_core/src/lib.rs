//! roomdrop core — ephemeral, room-scoped file relay.
//!
//! Devices join a code-addressed room over a WebSocket channel and exchange
//! files through the server without the bytes ever touching disk. A file is
//! split into SHA-256-hashed chunks described by a signed manifest; receivers
//! verify every chunk against the manifest and only expose the reassembled
//! bytes once the whole file checks out.
//!
//! Module map:
//! - [`transfer`] — hashing, manifest codec, chunk producer, receive sessions
//! - [`room`] — registry, per-room actors, presence, upload lifecycle relay
//! - [`store`] — in-memory file store scoped per room
//! - [`server`] — axum HTTP + WebSocket surface
//! - [`protocol`] — the tagged-union wire messages
//! - [`config`] — environment-driven server settings

pub mod config;
pub mod protocol;
pub mod room;
pub mod server;
pub mod store;
pub mod transfer;

pub use config::ServerConfig;
pub use protocol::{ClientMessage, DeviceInfo, ServerMessage};
