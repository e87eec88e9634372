//! Global error types for the Crew realtime client.
//!
//! Failures inside the transport, wire codec, configuration, and credential
//! layers are unified into a single `CrewError` enum with conversions from
//! underlying library errors. The public socket intents never return these;
//! they surface failures as events instead.

use thiserror::Error;

/// Convenience type alias for Results using CrewError.
pub type CrewResult<T> = Result<T, CrewError>;

/// Unified error type for the Crew crates.
#[derive(Error, Debug)]
pub enum CrewError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Credential errors --
    /// The credential store could not be read or written.
    #[error("credential store error: {0}")]
    Credentials(String),

    // -- Network errors --
    /// WebSocket transport error.
    #[error("socket error: {0}")]
    Socket(String),

    /// The server refused or failed the namespace handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An operation did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Failure with a chain of causes, rendered outermost first.
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for CrewError {
    fn from(e: serde_json::Error) -> Self {
        CrewError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for CrewError {
    fn from(e: toml::de::Error) -> Self {
        CrewError::Config(e.to_string())
    }
}
