//! Crew Socket - realtime connection manager and event dispatch.
//!
//! This crate provides the Socket.IO client behind chat and calls:
//! - Connection lifecycle with a handshake timeout and bounded reconnection
//! - Publish/subscribe event registry (callbacks and broadcast channel)
//! - Conversation room membership and typing indicators
//! - Message sending with a `socket_disconnected` fallback signal
//! - Call signaling relay
//! - A WebSocket transport on the `rust_socketio` async client

pub mod calls;
pub mod credentials;
pub mod events;
pub mod manager;
pub mod message;
pub mod registry;
pub mod rooms;
pub mod transport;
pub mod websocket;

// Re-export key types
pub use credentials::{
    CredentialStore, Credentials, FileCredentialStore, StaticCredentialStore, StoredSession,
    UserProfile,
};
pub use events::{
    ConnectionState, DisconnectReason, EventKind, MessageSentPayload, SocketEvent, TypingPayload,
};
pub use manager::{ConnectAttempt, ConnectionManager};
pub use message::SendMessageParams;
pub use registry::{listener, EventRegistry, Listener};
pub use transport::{Connector, HandshakeRequest, OutboundFrame, TransportEvent, TransportLink};
pub use websocket::WebSocketConnector;
