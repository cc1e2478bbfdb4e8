use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::transfer::constants::MAX_FILE_SIZE;

const DEFAULT_PORT: u16 = 5000;

/// Runtime settings for the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// Upper bound for an upload request body, in bytes
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            // Slack over the stored-file cap covers multipart framing.
            max_upload_bytes: MAX_FILE_SIZE + 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Reads `ROOMDROP_BIND` (socket address) and `ROOMDROP_MAX_UPLOAD_BYTES`.
    /// A `.env` file next to the process is honored if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("ROOMDROP_BIND") {
            match raw.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => tracing::warn!("ignoring invalid ROOMDROP_BIND {raw:?}: {e}"),
            }
        }
        if let Ok(raw) = std::env::var("ROOMDROP_MAX_UPLOAD_BYTES") {
            match raw.parse() {
                Ok(bytes) => config.max_upload_bytes = bytes,
                Err(e) => {
                    tracing::warn!("ignoring invalid ROOMDROP_MAX_UPLOAD_BYTES {raw:?}: {e}")
                }
            }
        }

        config
    }
}
