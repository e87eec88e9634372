//! Connect command - hold a socket session open and print events.

use console::style;
use tokio::sync::broadcast::error::RecvError;

use crew_core::config::AppConfig;
use crew_core::error::{CrewError, CrewResult};
use crew_socket::{ConnectionManager, SocketEvent};

use crate::OutputFormat;

/// Run the connect command.
pub async fn run(
    config: AppConfig,
    token: Option<String>,
    conversations: Vec<String>,
    format: OutputFormat,
) -> CrewResult<()> {
    super::require_server(&config)?;
    let store = super::credential_store(&config)?;
    let manager = ConnectionManager::from_config(&config, store);
    let mut rx = manager.subscribe();

    println!(
        "{} Connecting to {}...",
        style("[1/2]").bold().dim(),
        config.server.address
    );
    super::connect_and_wait(&manager, &mut rx, token).await?;

    println!("{} Joining conversations...", style("[2/2]").bold().dim());
    join_all(&manager, &conversations);
    println!("  Listening for events... (Ctrl+C to stop)");
    println!();

    let result = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(ev) => {
                    super::print_event(&ev, format);
                    match ev {
                        // Rooms are not rejoined by the socket layer.
                        SocketEvent::Connect { .. } => join_all(&manager, &conversations),
                        SocketEvent::ConnectionFailed { attempts } => {
                            break Err(CrewError::Handshake(format!(
                                "connection lost, gave up after {attempts} attempts"
                            )));
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    println!("  {} Missed {n} events (slow consumer)", style("WARN").yellow());
                }
                Err(RecvError::Closed) => break Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                break Ok(());
            }
        }
    };

    manager.disconnect();
    result
}

fn join_all(manager: &ConnectionManager, conversations: &[String]) {
    for id in conversations {
        if manager.join_conversation(id, None) {
            println!("  {} Joined {id}", style("OK").green());
        } else {
            println!("  {} Could not join {id}", style("WARN").yellow());
        }
    }
}
