//! Shared test utilities for integration tests.
//!
//! `MockConnector` stands in for the WebSocket transport. Every `open()`
//! hands a `MockSession` to the test, which plays the server side: it
//! acknowledges or rejects the handshake, pushes events, closes the link and
//! inspects the frames the manager wrote.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crew_core::config::SocketConfig;
use crew_core::error::{CrewError, CrewResult};
use crew_socket::{
    listener, ConnectionManager, ConnectionState, Connector, CredentialStore, DisconnectReason,
    EventKind, HandshakeRequest, OutboundFrame, SocketEvent, StaticCredentialStore,
    TransportEvent, TransportLink, UserProfile,
};

/// How long a test waits for something that should happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// Server side of one mock transport session.
pub struct MockSession {
    pub request: HandshakeRequest,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl MockSession {
    /// Acknowledge the namespace handshake.
    pub fn accept(&self) {
        let _ = self.inbound.send(TransportEvent::Connected {
            session_id: Some("sid-test".into()),
        });
    }

    /// Refuse the handshake.
    pub fn reject(&self, message: &str) {
        let _ = self.inbound.send(TransportEvent::ConnectError(message.into()));
    }

    /// End the session from the transport side.
    pub fn close(&self, reason: DisconnectReason) {
        let _ = self.inbound.send(TransportEvent::Closed(reason));
    }

    /// Push an inbound server event.
    pub fn push(&self, name: &str, data: Value) {
        let _ = self.inbound.send(TransportEvent::Event {
            name: name.into(),
            data,
        });
    }

    /// Next frame written by the manager, waiting up to [`WAIT`].
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// A frame already written by the manager, without waiting.
    pub fn try_frame(&mut self) -> Option<OutboundFrame> {
        self.outbound.try_recv().ok()
    }

    /// Next frame, which must be an emit; returns its event name and payload.
    pub async fn next_emit(&mut self) -> (String, Value) {
        match self.next_frame().await {
            Some(OutboundFrame::Emit { event, data }) => (event, data),
            other => panic!("expected an emitted frame, got {other:?}"),
        }
    }
}

/// Scripted transport: records handshake requests and hands sessions to the test.
pub struct MockConnector {
    requests: Mutex<Vec<HandshakeRequest>>,
    sessions: mpsc::UnboundedSender<MockSession>,
    fail_open: AtomicBool,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSession>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            sessions,
            fail_open: AtomicBool::new(false),
        });
        (connector, rx)
    }

    /// Make every subsequent `open()` fail immediately.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HandshakeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, request: &HandshakeRequest) -> CrewResult<TransportLink> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CrewError::Socket("connection refused".into()));
        }
        let (link, outbound, inbound) = TransportLink::pair();
        let _ = self.sessions.send(MockSession {
            request: request.clone(),
            outbound,
            inbound,
        });
        Ok(link)
    }
}

/// Socket settings with short timers so failure paths run quickly.
pub fn fast_socket_config() -> SocketConfig {
    SocketConfig {
        connect_timeout_ms: 300,
        reconnect_delay_ms: 30,
        max_reconnect_attempts: 3,
        event_channel_capacity: 64,
        client_platform: "linux".into(),
        client_version: "0.1.0-test".into(),
        ..SocketConfig::default()
    }
}

pub fn ann() -> UserProfile {
    UserProfile {
        id: "user-ann".into(),
        first_name: "Ann".into(),
        last_name: "Lee".into(),
        avatar_url: Some("https://cdn.example.com/ann.png".into()),
    }
}

/// Credential store holding a token and Ann's profile.
pub fn logged_in_store() -> Arc<StaticCredentialStore> {
    Arc::new(StaticCredentialStore::new(Some("token-ann".into()), Some(ann())))
}

/// Store whose token can be swapped while a manager is running.
pub struct RotatingStore {
    token: Mutex<Option<String>>,
}

impl RotatingStore {
    pub fn new(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }

    pub fn set_token(&self, token: Option<&str>) {
        *self.token.lock().unwrap() = token.map(str::to_string);
    }
}

#[async_trait]
impl CredentialStore for RotatingStore {
    async fn token(&self) -> CrewResult<Option<String>> {
        Ok(self.token.lock().unwrap().clone())
    }

    async fn cached_user(&self) -> CrewResult<Option<UserProfile>> {
        Ok(Some(ann()))
    }
}

/// A manager wired to a mock connector.
pub struct Harness {
    pub manager: ConnectionManager,
    pub connector: Arc<MockConnector>,
    sessions: mpsc::UnboundedReceiver<MockSession>,
}

impl Harness {
    pub fn new<S: CredentialStore + 'static>(store: Arc<S>) -> Self {
        Self::with_config(store, fast_socket_config())
    }

    pub fn with_config<S: CredentialStore + 'static>(store: Arc<S>, config: SocketConfig) -> Self {
        let (connector, sessions) = MockConnector::new();
        let manager = ConnectionManager::new(
            "http://localhost:4000",
            config,
            store,
            connector.clone(),
        );
        Self {
            manager,
            connector,
            sessions,
        }
    }

    /// The next session the manager opened.
    pub async fn next_session(&mut self) -> MockSession {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("manager did not open a session in time")
            .expect("connector dropped")
    }

    /// Assert the manager opens no session within `window`.
    pub async fn assert_no_session(&mut self, window: Duration) {
        if let Ok(Some(session)) = tokio::time::timeout(window, self.sessions.recv()).await {
            panic!("unexpected session opened: {:?}", session.request);
        }
    }

    /// Connect with stored credentials and acknowledge the handshake.
    pub async fn connected(&mut self) -> MockSession {
        self.manager.connect(None).await;
        let session = self.next_session().await;
        session.accept();
        wait_for_state(&self.manager, ConnectionState::Connected).await;
        session
    }
}

/// Wait until the manager reaches `state`.
pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut rx = manager.state_receiver();
    let reached = tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    assert!(reached, "timed out waiting for {state}, still {}", manager.state());
}

/// Record every event of `kind` delivered to a registered callback.
pub fn record(manager: &ConnectionManager, kind: EventKind) -> Arc<Mutex<Vec<SocketEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager.on(kind, listener(move |event| sink.lock().unwrap().push(event.clone())));
    seen
}

/// Give the dispatch task and timers a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

/// Wait for the next broadcast event of `kind`, skipping others.
pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<SocketEvent>,
    kind: EventKind,
) -> SocketEvent {
    let wanted = kind.clone();
    tokio::time::timeout(WAIT, async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.kind() == wanted => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
}
