//! Transport seam between the connection manager and the wire.
//!
//! A [`Connector`] opens one session and hands back a [`TransportLink`]: a
//! sender for outbound frames and a receiver of [`TransportEvent`]s. The
//! handshake acknowledgment arrives on that receiver as
//! [`TransportEvent::Connected`], so the manager's timeout covers both the
//! socket open and the namespace handshake.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crew_core::error::CrewResult;

use crate::events::DisconnectReason;

/// Everything a connector needs to authenticate one session.
#[derive(Clone)]
pub struct HandshakeRequest {
    /// Server base URL as configured (http, https, ws, or wss).
    pub server_address: String,
    /// Bearer token, also sent in the namespace auth payload.
    pub token: String,
    /// Resolved user id; may be empty when no profile is cached.
    pub user_id: String,
    /// Client platform tag.
    pub platform: String,
    /// Client version.
    pub client_version: String,
    /// Extra headers for the upgrade request.
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for HandshakeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeRequest")
            .field("server_address", &self.server_address)
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("client_version", &self.client_version)
            .finish()
    }
}

/// A frame the manager asks the transport to write.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Emit a named event with one argument.
    Emit { event: String, data: Value },
    /// Leave the namespace and close the connection.
    Close,
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The server acknowledged the namespace handshake.
    Connected { session_id: Option<String> },
    /// The server refused the handshake.
    ConnectError(String),
    /// An inbound named event.
    Event { name: String, data: Value },
    /// The session ended. Always the last event on a link.
    Closed(DisconnectReason),
}

/// Channels of one open session.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Create both halves: the link for the manager and the peer ends for the transport task.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        (Self { outbound, inbound }, outbound_rx, inbound_tx)
    }
}

/// Opens transport sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and start the handshake.
    ///
    /// An `Err` counts as a failed handshake.
    async fn open(&self, request: &HandshakeRequest) -> CrewResult<TransportLink>;
}
