//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "Crew";

/// Application version, sent as the client version during the socket handshake.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Socket.IO endpoint path on the server.
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io";

/// Time allowed for the transport handshake before the attempt fails.
pub const CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Delay before an automatic reconnection attempt.
pub const RECONNECT_DELAY_MS: u64 = 3_000;

/// Consecutive handshake failures tolerated before `connection_failed` is raised.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Default capacity of the broadcast event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// File name of the persisted login session inside the data directory.
pub const SESSION_FILE_NAME: &str = "session.json";
