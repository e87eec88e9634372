//! Platform detection and OS-specific utilities.

use std::path::PathBuf;
use crate::error::{CrewError, CrewResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
    Ios,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific application data directory.
    ///
    /// - Windows: `%APPDATA%/Crew`
    /// - macOS: `~/Library/Application Support/Crew`
    /// - Linux: `~/.local/share/Crew`
    pub fn data_dir() -> CrewResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| CrewError::Config("could not determine data directory".into()))?;
        Ok(base.join("Crew"))
    }

    /// Get the platform-specific configuration directory.
    pub fn config_dir() -> CrewResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| CrewError::Config("could not determine config directory".into()))?;
        Ok(base.join("Crew"))
    }

    /// Lowercase tag sent to the server as the client platform.
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }

    /// Get a human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::Android => "Android",
            Platform::Ios => "iOS",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
