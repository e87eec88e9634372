//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! the server URL, realtime socket tuning, logging, and the location of the
//! persisted login session. Configuration is persisted as TOML on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{CrewError, CrewResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Realtime socket settings.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the login session (token and cached profile) is stored.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Backend URL (e.g., "https://api.example.com").
    #[serde(default)]
    pub address: String,

    /// Custom HTTP headers sent with the socket upgrade request.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

/// Realtime socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Socket.IO endpoint path on the server.
    #[serde(default = "default_socket_path")]
    pub path: String,

    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Delay before an automatic reconnection attempt, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Consecutive handshake failures before giving up with `connection_failed`.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Capacity of the broadcast event channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Platform tag sent during the handshake.
    #[serde(default = "default_client_platform")]
    pub client_platform: String,

    /// Client version sent during the handshake.
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Credential store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Path to the session file. If empty, uses `<data dir>/session.json`.
    #[serde(default)]
    pub path: String,
}

// Default value functions for serde

fn default_socket_path() -> String {
    constants::DEFAULT_SOCKET_PATH.to_string()
}

fn default_connect_timeout() -> u64 {
    constants::CONNECT_TIMEOUT_MS
}

fn default_reconnect_delay() -> u64 {
    constants::RECONNECT_DELAY_MS
}

fn default_max_reconnect_attempts() -> u32 {
    constants::MAX_RECONNECT_ATTEMPTS
}

fn default_event_channel_capacity() -> usize {
    constants::EVENT_CHANNEL_CAPACITY
}

fn default_client_platform() -> String {
    Platform::current().tag().to_string()
}

fn default_client_version() -> String {
    constants::APP_VERSION.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            connect_timeout_ms: default_connect_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            event_channel_capacity: default_event_channel_capacity(),
            client_platform: default_client_platform(),
            client_version: default_client_version(),
        }
    }
}

impl SocketConfig {
    /// Handshake timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reconnection delay as a Duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> CrewResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> CrewResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file path.
    pub fn save_default(&self) -> CrewResult<()> {
        let path = Self::default_config_path()?;
        self.save_to_file(&path)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> CrewResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| CrewError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> CrewResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> CrewResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(Platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Get the effective session file path, using the configured path or the default.
    pub fn effective_credentials_path(&self) -> CrewResult<PathBuf> {
        if self.credentials.path.is_empty() {
            Ok(Platform::data_dir()?.join(constants::SESSION_FILE_NAME))
        } else {
            Ok(PathBuf::from(&self.credentials.path))
        }
    }

    /// Check whether the server connection is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.is_empty()
    }

    /// Sanitize and normalize a server address.
    ///
    /// Ensures the address has a scheme and strips surrounding quotes and
    /// trailing slashes. Bare hosts default to https unless they are local.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
            || trimmed.starts_with("ws://")
            || trimmed.starts_with("wss://")
        {
            trimmed.to_string()
        } else if is_local_host(trimmed) {
            format!("http://{trimmed}")
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

fn is_local_host(host: &str) -> bool {
    host.starts_with("localhost")
        || host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
}
