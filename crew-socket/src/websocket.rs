//! WebSocket connector built on the `rust_socketio` async client.
//!
//! The client owns the Engine.IO session (heartbeats, framing, the namespace
//! handshake). This module bridges its callbacks onto a [`TransportLink`] and
//! pumps [`OutboundFrame`]s into it. The client's own reconnection stays off;
//! retries belong to the connection manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload, TransportType};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use url::Url;

use crew_core::constants;
use crew_core::error::{CrewError, CrewResult};

use crate::events::DisconnectReason;
use crate::transport::{Connector, HandshakeRequest, OutboundFrame, TransportEvent, TransportLink};

/// Prefix the client puts on a namespace connect refusal.
const CONNECT_ERROR_PREFIX: &str = "Received an ConnectError frame: ";

/// Error texts the client reports once the Engine.IO session is gone
/// (missed ping, socket error, engine close).
const SESSION_LOST: [&str; 2] = ["EngineIO Error", "Underlying Engine.IO connection has closed"];

/// Opens Socket.IO sessions over a WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Socket.IO endpoint path, e.g. `/socket.io`.
    path: String,
}

impl WebSocketConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(constants::DEFAULT_SOCKET_PATH)
    }
}

/// Server URL with the Socket.IO path and the client query parameters.
///
/// The Engine.IO layer adds `EIO` and `transport` itself and switches the
/// scheme to `ws`/`wss` when it upgrades.
pub fn endpoint_url(request: &HandshakeRequest, path: &str) -> CrewResult<Url> {
    let mut url = Url::parse(&request.server_address)
        .map_err(|e| CrewError::Config(format!("invalid server address {:?}: {e}", request.server_address)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => {
            return Err(CrewError::Config(format!("unsupported server scheme {other:?}")));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CrewError::Config(format!("cannot use scheme {scheme} for {url}")))?;

    let trimmed = path.trim_matches('/');
    url.set_path(&format!("/{trimmed}/"));
    url.query_pairs_mut()
        .clear()
        .append_pair("platform", &request.platform)
        .append_pair("version", &request.client_version)
        .append_pair("userId", &request.user_id);
    Ok(url)
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, request: &HandshakeRequest) -> CrewResult<TransportLink> {
        let url = endpoint_url(request, &self.path)?;
        let (link, outbound_rx, inbound_tx) = TransportLink::pair();
        let bridge = Arc::new(Bridge::new(inbound_tx));

        let mut builder = ClientBuilder::new(url.as_str())
            .transport_type(TransportType::Websocket)
            .reconnect(false)
            .auth(json!({ "token": request.token }))
            .opening_header("Authorization", format!("Bearer {}", request.token));
        for (name, value) in &request.headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
                warn!("skipping invalid custom header {name:?}");
                continue;
            }
            builder = builder.opening_header(name.as_str(), value.as_str());
        }

        let on_connect = Arc::clone(&bridge);
        let on_close = Arc::clone(&bridge);
        let on_error = Arc::clone(&bridge);
        let on_event = Arc::clone(&bridge);
        builder = builder
            .on(Event::Connect, move |_: Payload, _: Client| {
                on_connect.connected();
                done()
            })
            .on(Event::Close, move |_: Payload, _: Client| {
                on_close.close(DisconnectReason::ServerDisconnect);
                done()
            })
            .on(Event::Error, move |payload: Payload, _: Client| {
                on_error.failed(payload);
                done()
            })
            .on_any(move |event: Event, payload: Payload, _: Client| {
                on_event.event(event, payload);
                done()
            });

        debug!("opening socket.io session to {}", url.host_str().unwrap_or_default());
        let client = builder
            .connect()
            .await
            .context("websocket connect failed")
            .map_err(CrewError::Other)?;

        tokio::spawn(pump_outbound(client, outbound_rx, bridge));
        Ok(link)
    }
}

fn done() -> BoxFuture<'static, ()> {
    async {}.boxed()
}

/// Forwards client callbacks onto one link. `Closed` is sent at most once
/// and nothing follows it.
struct Bridge {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    acknowledged: AtomicBool,
    closed: AtomicBool,
}

impl Bridge {
    fn new(inbound: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            inbound,
            acknowledged: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn forward(&self, event: TransportEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // Manager dropped the link; nobody is listening any more.
        let _ = self.inbound.send(event);
    }

    fn close(&self, reason: DisconnectReason) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("socket session closed: {reason}");
        let _ = self.inbound.send(TransportEvent::Closed(reason));
    }

    fn connected(&self) {
        self.acknowledged.store(true, Ordering::Release);
        self.forward(TransportEvent::Connected { session_id: None });
    }

    fn failed(&self, payload: Payload) {
        let args = match payload {
            Payload::Text(args) => args,
            _ => Vec::new(),
        };
        match classify_error(&args, self.acknowledged.load(Ordering::Acquire)) {
            ClientError::Refused(message) => self.forward(TransportEvent::ConnectError(message)),
            ClientError::SessionLost(detail) => self.close(DisconnectReason::TransportError(detail)),
            ClientError::Server => self.forward(TransportEvent::Event {
                name: "error".to_string(),
                data: args.into_iter().next().unwrap_or(Value::Null),
            }),
        }
    }

    fn event(&self, event: Event, payload: Payload) {
        let name = event.as_str().to_string();
        match payload {
            Payload::Text(args) => self.forward(TransportEvent::Event {
                name,
                data: args.into_iter().next().unwrap_or(Value::Null),
            }),
            _ => debug!("ignoring binary payload for {name}"),
        }
    }
}

/// What an `Event::Error` callback stands for.
#[derive(Debug, PartialEq)]
enum ClientError {
    /// The server refused the namespace connect.
    Refused(String),
    /// The Engine.IO session ended.
    SessionLost(String),
    /// An `error` event emitted by the server.
    Server,
}

fn classify_error(args: &[Value], acknowledged: bool) -> ClientError {
    let text = match args {
        [Value::String(text)] => text.as_str(),
        _ => return ClientError::Server,
    };
    if let Some(detail) = text.strip_prefix(CONNECT_ERROR_PREFIX) {
        let data = serde_json::from_str(detail).unwrap_or_else(|_| Value::String(detail.to_string()));
        return ClientError::Refused(connect_error_message(&data));
    }
    if SESSION_LOST.contains(&text) {
        return ClientError::SessionLost(text.to_string());
    }
    if acknowledged {
        ClientError::Server
    } else {
        ClientError::Refused(text.to_string())
    }
}

/// Human-readable reason from a CONNECT_ERROR payload.
pub fn connect_error_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Value::Null => "connection refused".to_string(),
        other => other.to_string(),
    }
}

async fn pump_outbound(
    client: Client,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    bridge: Arc<Bridge>,
) {
    let reason = loop {
        match outbound.recv().await {
            Some(OutboundFrame::Emit { event, data }) => {
                if let Err(e) = client.emit(event, data).await {
                    break DisconnectReason::TransportError(e.to_string());
                }
            }
            Some(OutboundFrame::Close) | None => break DisconnectReason::ClientDisconnect,
        }
    };

    if let Err(e) = client.disconnect().await {
        debug!("socket.io disconnect: {e}");
    }
    bridge.close(reason);
}

/// Custom headers from config, as a handshake header map.
pub fn headers_from_config(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| (k.trim().to_string(), v.clone()))
        .collect()
}
