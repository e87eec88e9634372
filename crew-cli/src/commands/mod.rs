//! CLI command implementations.

pub mod config;
pub mod connect;
pub mod send;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};

use crew_core::config::AppConfig;
use crew_core::error::{CrewError, CrewResult};
use crew_socket::{ConnectAttempt, ConnectionManager, FileCredentialStore, SocketEvent};

use crate::OutputFormat;

/// Credential store at the configured session file.
pub fn credential_store(config: &AppConfig) -> CrewResult<Arc<FileCredentialStore>> {
    Ok(Arc::new(FileCredentialStore::new(config.effective_credentials_path()?)))
}

/// Fail early when no server address is configured.
pub fn require_server(config: &AppConfig) -> CrewResult<()> {
    if config.is_server_configured() {
        Ok(())
    } else {
        println!(
            "  {} No server address configured. Use `crew config --address <url> --save`.",
            style("FAIL").red().bold()
        );
        Err(CrewError::MissingConfig("server.address".into()))
    }
}

/// Start connecting and wait until the handshake succeeds or retries run out.
pub async fn connect_and_wait(
    manager: &ConnectionManager,
    events: &mut broadcast::Receiver<SocketEvent>,
    token: Option<String>,
) -> CrewResult<()> {
    match manager.connect(token).await {
        ConnectAttempt::Started => {}
        ConnectAttempt::AlreadyActive => return Ok(()),
        ConnectAttempt::NoCredentials => {
            println!(
                "  {} Not logged in. Run `crew login` or pass --token.",
                style("FAIL").red().bold()
            );
            return Err(CrewError::Credentials("no auth token available".into()));
        }
        ConnectAttempt::Superseded => {
            return Err(CrewError::Internal("connect was cancelled".into()));
        }
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Waiting for handshake...");

    let outcome = loop {
        match events.recv().await {
            Ok(SocketEvent::Connect { .. }) => break Ok(()),
            Ok(SocketEvent::ConnectError { message, attempt }) => {
                pb.set_message(format!("Attempt {attempt} failed ({message}), retrying..."));
            }
            Ok(SocketEvent::ConnectionFailed { attempts }) => {
                break Err(CrewError::Handshake(format!(
                    "gave up after {attempts} attempts"
                )));
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                break Err(CrewError::Internal("event channel closed".into()));
            }
        }
    };
    pb.finish_and_clear();

    match &outcome {
        Ok(()) => println!("  {} Connected.", style("OK").green().bold()),
        Err(e) => println!("  {} {e}", style("FAIL").red().bold()),
    }
    outcome
}

/// Print one event in the selected format.
pub fn print_event(event: &SocketEvent, format: OutputFormat) {
    let kind = event.kind();
    match format {
        OutputFormat::Json => {
            let line = serde_json::json!({ "event": kind.as_str(), "data": event.payload() });
            println!("{line}");
        }
        OutputFormat::Text => {
            let tag = format!("[{kind}]");
            let tag = if kind.is_error_event() {
                style(tag).red()
            } else if kind.is_call_event() {
                style(tag).magenta()
            } else if kind.is_local() {
                style(tag).yellow()
            } else {
                style(tag).cyan()
            };
            println!("  {} {}", tag, event.payload());
        }
    }
}
