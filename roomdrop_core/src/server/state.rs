//! Shared server state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::room::registry::RoomRegistry;
use crate::store::FileStore;

/// State shared by every HTTP and WebSocket handler.
pub struct AppState {
    pub config: ServerConfig,
    pub rooms: RoomRegistry,
    pub store: FileStore,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            rooms: RoomRegistry::new(),
            store: FileStore::new(),
        })
    }
}
