//! Send command - deliver one message and wait for the acknowledgment.

use std::time::Duration;

use console::style;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crew_core::config::AppConfig;
use crew_core::error::{CrewError, CrewResult};
use crew_socket::{ConnectionManager, SendMessageParams, SocketEvent};

use crate::OutputFormat;

/// Arguments of `crew send`.
pub struct SendRequest {
    pub conversation: String,
    pub content: String,
    pub token: Option<String>,
    pub reply_to: Option<String>,
    /// Seconds to wait for `message_sent`.
    pub wait: u64,
}

/// Run the send command.
pub async fn run(config: AppConfig, request: SendRequest, format: OutputFormat) -> CrewResult<()> {
    super::require_server(&config)?;
    let store = super::credential_store(&config)?;
    let manager = ConnectionManager::from_config(&config, store);
    let mut rx = manager.subscribe();

    println!(
        "{} Connecting to {}...",
        style("[1/3]").bold().dim(),
        config.server.address
    );
    super::connect_and_wait(&manager, &mut rx, request.token.clone()).await?;

    println!(
        "{} Joining {}...",
        style("[2/3]").bold().dim(),
        request.conversation
    );
    manager.join_conversation(&request.conversation, None);

    println!("{} Sending...", style("[3/3]").bold().dim());
    let local_id = format!("temp-{}", Uuid::new_v4());
    let mut params = SendMessageParams::new(
        request.conversation.clone(),
        request.content,
        manager.user_id().unwrap_or_default(),
    )
    .with_message_id(local_id.clone());
    params.reply_to = request.reply_to;
    if let Some(user) = manager.current_user() {
        params.sender_name = Some(user.display_name());
    }

    let result = if manager.send_message(params) {
        wait_for_ack(&mut rx, &local_id, Duration::from_secs(request.wait), format).await
    } else {
        println!(
            "  {} Socket disconnected; message was not delivered.",
            style("FAIL").red().bold()
        );
        Err(CrewError::Socket("socket_disconnected".into()))
    };

    manager.disconnect();
    result
}

async fn wait_for_ack(
    rx: &mut tokio::sync::broadcast::Receiver<SocketEvent>,
    local_id: &str,
    wait: Duration,
    format: OutputFormat,
) -> CrewResult<()> {
    let outcome = tokio::time::timeout(wait, async {
        loop {
            match rx.recv().await {
                Ok(SocketEvent::MessageSent(ack)) if ack.message_id == local_id => {
                    return Ok(SocketEvent::MessageSent(ack));
                }
                Ok(ev @ SocketEvent::MessageError(_)) => return Err(ev),
                Ok(ev @ SocketEvent::Disconnect { .. }) => return Err(ev),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    return Err(SocketEvent::Other {
                        name: "closed".into(),
                        data: serde_json::Value::Null,
                    });
                }
            }
        }
    })
    .await;

    match outcome {
        Ok(Ok(ack)) => {
            super::print_event(&ack, format);
            println!("  {} Message delivered ({local_id}).", style("OK").green().bold());
            Ok(())
        }
        Ok(Err(event)) => {
            super::print_event(&event, format);
            Err(CrewError::Socket(format!("message {local_id} failed: {}", event.kind())))
        }
        Err(_) => {
            println!(
                "  {} No acknowledgment within {}s.",
                style("WARN").yellow(),
                wait.as_secs()
            );
            Err(CrewError::Timeout(format!("no message_sent for {local_id}")))
        }
    }
}
