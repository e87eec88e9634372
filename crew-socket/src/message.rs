//! Outbound chat messages.
//!
//! `send_message` never fails. When no session is connected it publishes
//! `socket_disconnected` with the original request, so the caller can fall
//! back to another delivery channel.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::credentials::UserProfile;
use crate::events::{outbound, SocketEvent};
use crate::manager::ConnectionManager;

/// A message send request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    pub conversation_id: String,
    pub content: String,
    /// Used as the sender when no profile is cached.
    pub sender_id: String,
    /// "First Last"; split on the first space when no profile is cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Local id used to correlate `message_sent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SendMessageParams {
    pub fn new(
        conversation_id: impl Into<String>,
        content: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            sender_id: sender_id.into(),
            ..Self::default()
        }
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// Sender object for the envelope: the cached profile, or one built from the params.
fn sender_value(params: &SendMessageParams, identity: Option<&UserProfile>) -> Value {
    if let Some(user) = identity {
        match serde_json::to_value(user) {
            Ok(value) => return value,
            Err(e) => warn!("could not serialize cached profile: {e}"),
        }
    }
    let name = params.sender_name.as_deref().unwrap_or_default();
    let (first, last) = name.split_once(' ').unwrap_or((name, ""));
    json!({
        "_id": params.sender_id,
        "firstName": first,
        "lastName": last,
    })
}

/// Build the `send_message` payload.
pub fn build_envelope(params: &SendMessageParams, identity: Option<&UserProfile>) -> Value {
    let message_id = params
        .message_id
        .clone()
        .unwrap_or_else(|| format!("temp-{}", Uuid::new_v4()));
    let created_at = params
        .created_at
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    json!({
        "conversationId": params.conversation_id,
        "message": {
            "_id": message_id,
            "content": params.content,
            "isEncrypted": params.is_encrypted,
            "messageHash": params.message_hash,
            "replyTo": params.reply_to,
            "sender": sender_value(params, identity),
            "createdAt": created_at,
        }
    })
}

impl ConnectionManager {
    /// Send a chat message.
    ///
    /// Returns `true` when the message was handed to the transport. Otherwise
    /// a single `socket_disconnected` event carrying `params` is published.
    pub fn send_message(&self, params: SendMessageParams) -> bool {
        let envelope = build_envelope(&params, self.current_user().as_ref());
        if self.emit_if_connected(outbound::SEND_MESSAGE, envelope) {
            return true;
        }
        info!(
            "socket not connected, reporting message for {} as undelivered",
            params.conversation_id
        );
        self.publish(SocketEvent::SocketDisconnected(params));
        false
    }
}
