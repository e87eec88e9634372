//! Crew Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other Crew crates:
//! - Application configuration (server URL, socket tuning, credential location)
//! - Global error types for the realtime client
//! - Structured logging with tracing
//! - Platform detection utilities
//! - Common constants

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, SocketConfig};
pub use error::{CrewError, CrewResult};
pub use logging::init_logging;
pub use platform::Platform;
