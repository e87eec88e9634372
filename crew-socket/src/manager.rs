//! Socket connection manager.
//!
//! Owns the connection lifecycle: credential resolution, the handshake with
//! its timeout, bounded reconnection, and routing of inbound transport events
//! into the [`EventRegistry`]. Outbound intents (rooms, messages, calls) are
//! implemented in their own modules on top of [`ConnectionManager`].
//!
//! All session state sits behind one mutex that is never held across an
//! `.await`. Every handshake attempt gets a generation number; timers and
//! transport callbacks from an older generation are ignored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crew_core::config::{AppConfig, SocketConfig};

use crate::credentials::{CredentialStore, Credentials, UserProfile};
use crate::events::{ConnectionState, DisconnectReason, EventKind, SocketEvent};
use crate::registry::{EventRegistry, Listener};
use crate::transport::{Connector, HandshakeRequest, OutboundFrame, TransportEvent, TransportLink};
use crate::websocket::{self, WebSocketConnector};

/// Outcome of [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    /// A handshake attempt is now in flight.
    Started,
    /// Already connecting or connected; nothing changed.
    AlreadyActive,
    /// No auth token was supplied or stored.
    NoCredentials,
    /// `disconnect()` was called while credentials were being resolved.
    Superseded,
}

/// Realtime connection manager.
///
/// Cheap to clone; clones share one session. Must be created inside a
/// tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    server_address: String,
    config: SocketConfig,
    headers: HashMap<String, String>,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialStore>,
    registry: EventRegistry,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct Session {
    state: ConnectionState,
    generation: u64,
    credentials: Option<Credentials>,
    /// Token passed to `connect()`, used by retries when the store has none.
    explicit_token: Option<String>,
    identity: Option<UserProfile>,
    reconnect_attempts: u32,
    link: Option<mpsc::UnboundedSender<OutboundFrame>>,
    driver: Option<JoinHandle<()>>,
    connect_timeout: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

fn cancel(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
    }
}

impl ConnectionManager {
    /// Create a manager for `server_address` using the given transport.
    pub fn new(
        server_address: impl Into<String>,
        config: SocketConfig,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self::build(server_address.into(), config, HashMap::new(), credentials, connector)
    }

    /// Create a manager speaking Socket.IO over WebSocket, configured from `config`.
    pub fn from_config(config: &AppConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let connector = Arc::new(WebSocketConnector::new(config.socket.path.clone()));
        Self::build(
            config.server.address.clone(),
            config.socket.clone(),
            websocket::headers_from_config(&config.server.custom_headers),
            credentials,
            connector,
        )
    }

    fn build(
        server_address: String,
        config: SocketConfig,
        headers: HashMap<String, String>,
        credentials: Arc<dyn CredentialStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let registry = EventRegistry::new(config.event_channel_capacity);
        Self {
            shared: Arc::new(Shared {
                server_address,
                config,
                headers,
                connector,
                credentials,
                registry,
                session: Mutex::new(Session::default()),
                state_tx,
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.session().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The event registry shared with subscribers.
    pub fn registry(&self) -> &EventRegistry {
        &self.shared.registry
    }

    /// Register a callback for `kind`.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.shared.registry.on(kind, listener);
    }

    /// Remove a callback registered with [`on`](Self::on).
    pub fn off(&self, kind: &EventKind, listener: &Listener) {
        self.shared.registry.off(kind, listener);
    }

    /// Receive every event through a broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.shared.registry.subscribe()
    }

    pub fn server_address(&self) -> &str {
        &self.shared.server_address
    }

    /// Profile cached by the last successful `connect()`.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.shared.session().identity.clone()
    }

    /// Id of the signed-in user: the cached profile first, then the credentials.
    pub fn user_id(&self) -> Option<String> {
        let session = self.shared.session();
        session
            .identity
            .as_ref()
            .map(|u| u.id.clone())
            .or_else(|| session.credentials.as_ref().map(|c| c.user_id.clone()))
            .filter(|id| !id.is_empty())
    }

    /// Consecutive failed handshakes since the last success or explicit connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.session().reconnect_attempts
    }

    /// Start connecting.
    ///
    /// Uses `token` when given, otherwise asks the credential store. Does
    /// nothing while already connecting or connected.
    pub async fn connect(&self, token: Option<String>) -> ConnectAttempt {
        let generation = {
            let mut session = self.shared.session();
            if session.state != ConnectionState::Disconnected {
                debug!("connect ignored: already {}", session.state);
                return ConnectAttempt::AlreadyActive;
            }
            session.reconnect_attempts = 0;
            cancel(&mut session.reconnect_timer);
            session.generation += 1;
            self.shared.set_state(&mut session, ConnectionState::Connecting);
            session.generation
        };

        let explicit_token = token.filter(|t| !t.trim().is_empty());
        let token = match explicit_token.clone() {
            Some(token) => Some(token),
            None => self.shared.stored_token().await,
        };
        let Some(auth_token) = token else {
            info!("no auth token available, not connecting");
            let mut session = self.shared.session();
            if session.generation == generation {
                self.shared.set_state(&mut session, ConnectionState::Disconnected);
            }
            return ConnectAttempt::NoCredentials;
        };

        let identity = self.shared.stored_user().await;

        let mut session = self.shared.session();
        if session.generation != generation {
            debug!("connect superseded while resolving credentials");
            return ConnectAttempt::Superseded;
        }
        session.explicit_token = explicit_token;
        Shared::sign_in(&mut session, auth_token, identity);
        info!("connecting to {}", self.shared.server_address);
        self.shared.start_attempt(&mut session);
        ConnectAttempt::Started
    }

    /// Tear down the session.
    ///
    /// Cancels pending timers, closes the transport, forgets credentials and
    /// the cached profile, and drops every registered callback. Callbacks
    /// registered at the time still receive the final `disconnect` event.
    pub fn disconnect(&self) {
        let mut session = self.shared.session();
        session.generation += 1;
        cancel(&mut session.connect_timeout);
        cancel(&mut session.reconnect_timer);
        let was_connected = session.state == ConnectionState::Connected;
        self.shared.close_link(&mut session);
        session.reconnect_attempts = 0;
        self.shared.set_state(&mut session, ConnectionState::Disconnected);
        if was_connected {
            self.shared.registry.emit(SocketEvent::Disconnect {
                reason: DisconnectReason::ClientDisconnect,
            });
        }
        self.shared.forget_session(&mut session);
        info!("socket disconnected");
    }

    /// Hand an event to the transport if connected. Returns whether it was sent.
    pub(crate) fn emit_if_connected(&self, event: &str, data: Value) -> bool {
        let session = self.shared.session();
        if session.state != ConnectionState::Connected {
            debug!("not connected, dropping {event}");
            return false;
        }
        match &session.link {
            Some(link) => {
                let sent = link
                    .send(OutboundFrame::Emit {
                        event: event.to_string(),
                        data,
                    })
                    .is_ok();
                if sent {
                    debug!("emitted {event}");
                }
                sent
            }
            None => false,
        }
    }

    /// Publish a locally raised event.
    pub(crate) fn publish(&self, event: SocketEvent) {
        self.shared.registry.emit(event);
    }
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Session> {
        // No code panics while holding the lock, so a poisoned guard is still consistent.
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, session: &mut Session, state: ConnectionState) {
        if session.state != state {
            info!("socket state: {} -> {}", session.state, state);
            session.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Auth token from the store. Read errors count as logged out.
    async fn stored_token(&self) -> Option<String> {
        self.credentials
            .token()
            .await
            .unwrap_or_else(|e| {
                warn!("could not read auth token: {e}");
                None
            })
            .filter(|t| !t.trim().is_empty())
    }

    async fn stored_user(&self) -> Option<UserProfile> {
        self.credentials.cached_user().await.unwrap_or_else(|e| {
            warn!("could not read cached user: {e}");
            None
        })
    }

    fn sign_in(session: &mut Session, auth_token: String, identity: Option<UserProfile>) {
        let user_id = identity.as_ref().map(|u| u.id.clone()).unwrap_or_default();
        session.credentials = Some(Credentials { auth_token, user_id });
        session.identity = identity;
    }

    /// Drop credentials, the cached profile and every callback together.
    ///
    /// Callers emit their final event first; dispatch works on a snapshot,
    /// so current listeners still receive it.
    fn forget_session(&self, session: &mut Session) {
        session.credentials = None;
        session.explicit_token = None;
        session.identity = None;
        self.registry.clear();
    }

    /// Open a new transport session with the current credentials.
    fn start_attempt(self: &Arc<Self>, session: &mut Session) {
        let Some(credentials) = session.credentials.clone() else {
            warn!("no credentials cached, cannot start a handshake");
            self.set_state(session, ConnectionState::Disconnected);
            return;
        };

        session.generation += 1;
        let generation = session.generation;
        self.set_state(session, ConnectionState::Connecting);

        let request = HandshakeRequest {
            server_address: self.server_address.clone(),
            token: credentials.auth_token,
            user_id: credentials.user_id,
            platform: self.config.client_platform.clone(),
            client_version: self.config.client_version.clone(),
            headers: self.headers.clone(),
        };

        let timeout = self.config.connect_timeout();
        let shared = Arc::clone(self);
        cancel(&mut session.connect_timeout);
        session.connect_timeout = Some(tokio::spawn(async move {
            sleep(timeout).await;
            shared.handshake_failed(generation, "connection timeout");
        }));

        let shared = Arc::clone(self);
        cancel(&mut session.driver);
        session.driver = Some(tokio::spawn(drive(shared, generation, request)));
    }

    fn handshake_failed(self: &Arc<Self>, generation: u64, message: &str) {
        let mut session = self.session();
        if session.generation != generation || session.state != ConnectionState::Connecting {
            debug!("ignoring stale handshake failure: {message}");
            return;
        }
        self.fail_attempt(&mut session, message);
    }

    fn fail_attempt(self: &Arc<Self>, session: &mut Session, message: &str) {
        cancel(&mut session.connect_timeout);
        self.close_link(session);
        session.reconnect_attempts += 1;
        let attempt = session.reconnect_attempts;
        self.set_state(session, ConnectionState::Disconnected);

        warn!("connection attempt {attempt} failed: {message}");
        self.registry.emit(SocketEvent::ConnectError {
            message: message.to_string(),
            attempt,
        });

        if attempt >= self.config.max_reconnect_attempts {
            error!("giving up after {attempt} failed connection attempts");
            self.registry.emit(SocketEvent::ConnectionFailed { attempts: attempt });
            self.forget_session(session);
        } else {
            self.schedule_reconnect(session);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, session: &mut Session) {
        cancel(&mut session.reconnect_timer);
        let generation = session.generation;
        let delay = self.config.reconnect_delay();
        info!("reconnecting in {}ms", delay.as_millis());

        let shared = Arc::clone(self);
        session.reconnect_timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            shared.reconnect(generation).await;
        }));
    }

    /// Resolve credentials again, then start the next handshake.
    ///
    /// The stored token wins, so a token refreshed after a rejection is
    /// picked up. A token passed to `connect()` is the fallback.
    async fn reconnect(self: &Arc<Self>, generation: u64) {
        let (generation, explicit_token) = {
            let mut session = self.session();
            session.reconnect_timer.take();
            if session.generation != generation || session.state != ConnectionState::Disconnected {
                debug!("reconnect skipped: session changed");
                return;
            }
            if session.credentials.is_none() {
                debug!("reconnect skipped: credentials cleared");
                return;
            }
            session.generation += 1;
            self.set_state(&mut session, ConnectionState::Connecting);
            (session.generation, session.explicit_token.clone())
        };

        let token = self.stored_token().await.or(explicit_token);
        let identity = self.stored_user().await;

        let mut session = self.session();
        if session.generation != generation {
            debug!("reconnect superseded while resolving credentials");
            return;
        }
        let Some(auth_token) = token else {
            warn!("auth token is gone, not reconnecting");
            self.set_state(&mut session, ConnectionState::Disconnected);
            self.forget_session(&mut session);
            return;
        };
        Self::sign_in(&mut session, auth_token, identity);
        info!("reconnect attempt {}", session.reconnect_attempts + 1);
        self.start_attempt(&mut session);
    }

    fn close_link(&self, session: &mut Session) {
        if let Some(link) = session.link.take() {
            let _ = link.send(OutboundFrame::Close);
        }
        cancel(&mut session.driver);
    }

    /// Handle one transport event. Returns `false` once the link is finished.
    fn on_transport_event(self: &Arc<Self>, generation: u64, event: TransportEvent) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            debug!("ignoring event from a stale session");
            return false;
        }

        match event {
            TransportEvent::Connected { session_id } => {
                if session.state != ConnectionState::Connecting {
                    return true;
                }
                cancel(&mut session.connect_timeout);
                session.reconnect_attempts = 0;
                self.set_state(&mut session, ConnectionState::Connected);
                info!("socket connected");
                self.registry.emit(SocketEvent::Connect { session_id });
                true
            }
            TransportEvent::ConnectError(message) => {
                if session.state == ConnectionState::Connecting {
                    self.fail_attempt(&mut session, &message);
                }
                false
            }
            TransportEvent::Event { name, data } => {
                if session.state == ConnectionState::Connected {
                    debug!("socket event: {name}");
                    self.registry.emit(SocketEvent::from_wire(&name, data));
                } else {
                    debug!("dropping {name} received before the handshake completed");
                }
                true
            }
            TransportEvent::Closed(reason) => {
                match session.state {
                    ConnectionState::Connecting => {
                        self.fail_attempt(&mut session, &reason.to_string());
                    }
                    ConnectionState::Connected => {
                        self.close_link(&mut session);
                        self.set_state(&mut session, ConnectionState::Disconnected);
                        warn!("socket disconnected: {reason}");
                        let reconnect = !reason.is_local();
                        self.registry.emit(SocketEvent::Disconnect { reason });
                        if reconnect {
                            self.schedule_reconnect(&mut session);
                        }
                    }
                    ConnectionState::Disconnected => {}
                }
                false
            }
        }
    }
}

/// Run one transport session: open it, then pump its events.
async fn drive(shared: Arc<Shared>, generation: u64, request: HandshakeRequest) {
    debug!("opening transport: {request:?}");
    let TransportLink { outbound, mut inbound } = match shared.connector.open(&request).await {
        Ok(link) => link,
        Err(e) => {
            shared.handshake_failed(generation, &e.to_string());
            return;
        }
    };

    {
        let mut session = shared.session();
        if session.generation != generation {
            let _ = outbound.send(OutboundFrame::Close);
            return;
        }
        session.link = Some(outbound);
    }

    while let Some(event) = inbound.recv().await {
        if !shared.on_transport_event(generation, event) {
            return;
        }
    }
    shared.on_transport_event(generation, TransportEvent::Closed(DisconnectReason::TransportClose));
}
