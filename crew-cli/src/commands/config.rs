//! Config command - show and update the effective configuration.

use std::path::Path;

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;

use crew_core::config::AppConfig;
use crew_core::error::CrewResult;

use crate::OutputFormat;

/// Run the config command.
pub fn run(
    mut config: AppConfig,
    path: &Path,
    address: Option<String>,
    save: bool,
    format: OutputFormat,
) -> CrewResult<()> {
    if let Some(addr) = address {
        config.server.address = AppConfig::sanitize_server_address(&addr);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Text => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Key", "Value"]);
            for (key, value) in rows(&config) {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{table}");
            println!("  Config file: {}", path.display());
        }
    }

    if save {
        config.save_to_file(path)?;
        println!("  {} Config saved to {}", style("OK").green(), path.display());
    }
    Ok(())
}

fn rows(config: &AppConfig) -> Vec<(&'static str, String)> {
    let or_unset = |s: &str| {
        if s.is_empty() {
            "(not set)".to_string()
        } else {
            s.to_string()
        }
    };
    let credentials = config
        .effective_credentials_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| format!("(unavailable: {e})"));

    vec![
        ("server.address", or_unset(&config.server.address)),
        (
            "server.custom_headers",
            config.server.custom_headers.len().to_string(),
        ),
        ("socket.path", config.socket.path.clone()),
        (
            "socket.connect_timeout_ms",
            config.socket.connect_timeout_ms.to_string(),
        ),
        (
            "socket.reconnect_delay_ms",
            config.socket.reconnect_delay_ms.to_string(),
        ),
        (
            "socket.max_reconnect_attempts",
            config.socket.max_reconnect_attempts.to_string(),
        ),
        (
            "socket.event_channel_capacity",
            config.socket.event_channel_capacity.to_string(),
        ),
        ("socket.client_platform", config.socket.client_platform.clone()),
        ("socket.client_version", config.socket.client_version.clone()),
        ("logging.level", config.logging.level.clone()),
        ("logging.directory", or_unset(&config.logging.directory)),
        ("logging.json_output", config.logging.json_output.to_string()),
        ("credentials.path", credentials),
    ]
}
