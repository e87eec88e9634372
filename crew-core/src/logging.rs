//! Tracing subscriber setup for the Crew binaries.
//!
//! A bare level such as `"debug"` applies to the crew crates only; the socket
//! stack underneath (`rust_socketio`, `rust_engineio`, tungstenite) stays at
//! `warn` unless a full directive list asks for more. `RUST_LOG` wins when set.

use std::path::Path;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants;
use crate::error::{CrewError, CrewResult};

/// Crates whose events follow the configured level.
const CREW_TARGETS: [&str; 3] = ["crew_core", "crew_socket", "crew_cli"];

/// Level for everything outside [`CREW_TARGETS`].
const DEPENDENCY_LEVEL: &str = "warn";

/// Expand a configured level into filter directives.
///
/// Anything already shaped like a directive list (`target=level`, or several
/// comma-separated entries) is passed through untouched.
pub fn default_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    let mut directives = vec![DEPENDENCY_LEVEL.to_string()];
    directives.extend(CREW_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// File name prefix for the daily log, e.g. `crew.log.2026-10-18`.
pub fn log_file_prefix() -> String {
    format!("{}.log", constants::APP_NAME.to_lowercase())
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")))
}

/// Install console output plus a daily-rotated file under `log_dir`.
///
/// With `json_output` the file gets one JSON object per event; the console
/// always stays compact text.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> CrewResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, log_file_prefix());
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if json_output {
        fmt::layer()
            .with_writer(non_blocking)
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).compact())
        .with(file_layer)
        .try_init()
        .map_err(|e| CrewError::Internal(format!("failed to install subscriber: {e}")))?;

    tracing::info!(
        "logging initialized: {} -> {}",
        default_directives(level),
        log_dir.join(log_file_prefix()).display()
    );

    Ok(LogGuard { _guard: guard })
}

/// Keeps the non-blocking file writer alive; dropping it flushes the log.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Console-only logging, used when the log directory is unavailable.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).compact())
        .try_init();
}
