/// Chunk payload size for relayed transfers (64KB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on a single chunk payload accepted from the wire (1MB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Upper bound on the number of chunks a manifest may describe
pub const MAX_CHUNK_COUNT: usize = 65_536;

/// Maximum file size held in memory for relay (256MB)
pub const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Maximum accepted filename length
pub const MAX_FILENAME_LENGTH: usize = 255;

/// How long a transfer session may sit idle before it is reaped (5 minutes)
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 300;
