//! Crew CLI - command-line front end for the realtime client.
//!
//! Connects to the chat server from a terminal, prints live events, sends
//! messages, and manages the local login session and configuration.
//! Handy for scripting and for debugging the socket layer.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crew_core::config::AppConfig;
use crew_core::error::CrewResult;
use crew_core::constants;
use crew_core::logging;
use crew_core::platform::Platform;

/// Crew - realtime chat and call signaling client.
#[derive(Parser)]
#[command(
    name = "crew",
    version,
    about = "Crew realtime client CLI",
    long_about = "A command-line interface for the Crew realtime client.\n\
                   Connect to the chat server, watch live events, and send messages."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and print events until Ctrl+C.
    Connect {
        /// Auth token (overrides the stored session).
        #[arg(short, long)]
        token: Option<String>,
        /// Conversation to join once connected. May be repeated.
        #[arg(short = 'j', long = "join")]
        conversations: Vec<String>,
    },
    /// Send a message to a conversation.
    Send {
        /// Conversation id.
        #[arg(long)]
        conversation: String,
        /// Message text.
        content: String,
        /// Auth token (overrides the stored session).
        #[arg(short, long)]
        token: Option<String>,
        /// Id of the message being replied to.
        #[arg(long)]
        reply_to: Option<String>,
        /// Seconds to wait for the server acknowledgment.
        #[arg(short, long, default_value = "10")]
        wait: u64,
    },
    /// Store an auth token and profile for later connections.
    Login {
        /// Auth token (prompted if omitted).
        #[arg(short, long)]
        token: Option<String>,
        /// Id of the signed-in user.
        #[arg(short, long)]
        user_id: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        /// Avatar URL.
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Remove the stored session.
    Logout,
    /// Show the effective configuration.
    Config {
        /// Set the server address.
        #[arg(short, long)]
        address: Option<String>,
        /// Write the configuration back to disk.
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> CrewResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config.as_deref() {
        Some(path) => PathBuf::from(path),
        None => AppConfig::default_config_path()?,
    };
    let config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = match logging::init_logging(log_level, &log_dir, config.logging.json_output) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console_logging(log_level);
            warn!("file logging unavailable ({e}), logging to console only");
            None
        }
    };

    info!(
        "{} CLI v{} on {}",
        constants::APP_NAME,
        constants::APP_VERSION,
        Platform::current()
    );

    match cli.command {
        Commands::Connect { token, conversations } => {
            commands::connect::run(config, token, conversations, cli.format).await
        }
        Commands::Send {
            conversation,
            content,
            token,
            reply_to,
            wait,
        } => {
            let request = commands::send::SendRequest {
                conversation,
                content,
                token,
                reply_to,
                wait,
            };
            commands::send::run(config, request, cli.format).await
        }
        Commands::Login {
            token,
            user_id,
            first_name,
            last_name,
            avatar,
        } => {
            let profile = crew_socket::UserProfile {
                id: user_id,
                first_name,
                last_name,
                avatar_url: avatar,
            };
            commands::session::login(config, token, profile).await
        }
        Commands::Logout => commands::session::logout(config).await,
        Commands::Config { address, save } => {
            commands::config::run(config, &config_path, address, save, cli.format)
        }
    }
}
