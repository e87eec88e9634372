//! Socket event types.
//!
//! Defines every event the realtime layer can publish, inbound from the
//! server or raised locally by the connection manager, together with the
//! typed payloads this crate owns. Server-owned objects (messages, room
//! state, call metadata, error descriptions) are carried as JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::message::SendMessageParams;

/// Names of the intents this client emits to the server.
pub mod outbound {
    pub const JOIN_CONVERSATION: &str = "join_conversation";
    pub const LEAVE_CONVERSATION: &str = "leave_conversation";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const ACCEPT_CALL: &str = "accept_call";
    pub const REJECT_CALL: &str = "reject_call";
    pub const END_CALL: &str = "end_call";
    pub const INITIATE_CALL: &str = "initiate_call";
}

/// Discriminant of a [`SocketEvent`], used as the key of the listener table.
///
/// `as_str` yields the wire name, so subscribers can be keyed by either.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Handshake acknowledged (`connect`).
    Connect,
    /// Transport session ended (`disconnect`).
    Disconnect,
    /// A handshake attempt failed or timed out (`connect_error`).
    ConnectError,
    /// The reconnection ceiling was reached (`connection_failed`).
    ConnectionFailed,
    /// A message could not be sent because no session is connected (`socket_disconnected`).
    SocketDisconnected,
    /// A message arrived in a joined conversation (`new_message`).
    NewMessage,
    /// The server acknowledged a sent message (`message_sent`).
    MessageSent,
    /// A participant started typing (`user_typing`).
    UserTyping,
    /// A participant stopped typing (`user_stop_typing`).
    UserStopTyping,
    /// The server confirmed a room join (`joined_conversation`).
    JoinedConversation,
    /// Room state changed (`conversation_updated`).
    ConversationUpdated,
    /// Generic server-side error (`error`).
    Error,
    /// A message was rejected by the server (`message_error`).
    MessageError,
    /// Someone is calling (`incoming_call`).
    IncomingCall,
    /// The callee accepted (`call_accepted`).
    CallAccepted,
    /// The callee rejected (`call_rejected`).
    CallRejected,
    /// The call was hung up (`call_ended`).
    CallEnded,
    /// Any other event name the server sends.
    Other(String),
}

impl EventKind {
    /// Parse an event name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "connect_error" => Self::ConnectError,
            "connection_failed" => Self::ConnectionFailed,
            "socket_disconnected" => Self::SocketDisconnected,
            "new_message" => Self::NewMessage,
            "message_sent" => Self::MessageSent,
            "user_typing" => Self::UserTyping,
            "user_stop_typing" => Self::UserStopTyping,
            "joined_conversation" => Self::JoinedConversation,
            "conversation_updated" => Self::ConversationUpdated,
            "error" => Self::Error,
            "message_error" => Self::MessageError,
            "incoming_call" => Self::IncomingCall,
            "call_accepted" => Self::CallAccepted,
            "call_rejected" => Self::CallRejected,
            "call_ended" => Self::CallEnded,
            other => Self::Other(other.to_string()),
        }
    }

    /// The event name as used on the wire and in the listener table.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::ConnectionFailed => "connection_failed",
            Self::SocketDisconnected => "socket_disconnected",
            Self::NewMessage => "new_message",
            Self::MessageSent => "message_sent",
            Self::UserTyping => "user_typing",
            Self::UserStopTyping => "user_stop_typing",
            Self::JoinedConversation => "joined_conversation",
            Self::ConversationUpdated => "conversation_updated",
            Self::Error => "error",
            Self::MessageError => "message_error",
            Self::IncomingCall => "incoming_call",
            Self::CallAccepted => "call_accepted",
            Self::CallRejected => "call_rejected",
            Self::CallEnded => "call_ended",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Events raised by the connection manager itself rather than the server.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Connect
                | Self::Disconnect
                | Self::ConnectError
                | Self::ConnectionFailed
                | Self::SocketDisconnected
        )
    }

    /// Whether this event belongs to call signaling.
    pub fn is_call_event(&self) -> bool {
        matches!(
            self,
            Self::IncomingCall | Self::CallAccepted | Self::CallRejected | Self::CallEnded
        )
    }

    /// Whether this event reports a failure.
    pub fn is_error_event(&self) -> bool {
        matches!(
            self,
            Self::ConnectError
                | Self::ConnectionFailed
                | Self::SocketDisconnected
                | Self::Error
                | Self::MessageError
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transport session ended.
///
/// `as_str` matches the Socket.IO reason strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called locally.
    ClientDisconnect,
    /// The server closed the namespace.
    ServerDisconnect,
    /// The underlying connection was closed.
    TransportClose,
    /// The underlying connection failed.
    TransportError(String),
    /// The server stopped answering heartbeats.
    PingTimeout,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ClientDisconnect => "io client disconnect",
            Self::ServerDisconnect => "io server disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError(_) => "transport error",
            Self::PingTimeout => "ping timeout",
        }
    }

    /// Only an explicit local disconnect suppresses automatic reconnection.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::ClientDisconnect)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportError(detail) if !detail.is_empty() => {
                write!(f, "{}: {detail}", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Typed payload for `user_typing` / `user_stop_typing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    pub user_id: String,
}

/// Typed payload for `message_sent` delivery acknowledgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentPayload {
    /// Server id of the stored message, or the local id echoed back.
    #[serde(default)]
    pub message_id: String,
    /// Populated sender object as stored by the server.
    #[serde(default)]
    pub sender: Value,
}

/// Lifecycle state of the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session, no attempt in flight.
    #[default]
    Disconnected,
    /// A handshake is in flight.
    Connecting,
    /// The handshake was acknowledged; intents are transmitted.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// An event published through the [`EventRegistry`](crate::registry::EventRegistry).
#[derive(Debug, Clone)]
pub enum SocketEvent {
    Connect {
        /// Session id assigned by the server, if it sent one.
        session_id: Option<String>,
    },
    Disconnect {
        reason: DisconnectReason,
    },
    ConnectError {
        message: String,
        /// Value of the reconnect counter after this failure.
        attempt: u32,
    },
    ConnectionFailed {
        attempts: u32,
    },
    /// Carries the original send request so a fallback channel can retry it.
    SocketDisconnected(SendMessageParams),
    NewMessage(Value),
    MessageSent(MessageSentPayload),
    UserTyping(TypingPayload),
    UserStopTyping(TypingPayload),
    JoinedConversation(Value),
    ConversationUpdated(Value),
    Error(Value),
    MessageError(Value),
    IncomingCall(Value),
    CallAccepted(Value),
    CallRejected(Value),
    CallEnded(Value),
    /// An event with no typed mapping, or whose typed payload did not parse.
    Other { name: String, data: Value },
}

impl SocketEvent {
    /// Build an event from an inbound wire event.
    ///
    /// Names reserved for locally raised events are not trusted from the
    /// wire and arrive as [`SocketEvent::Other`].
    pub fn from_wire(name: &str, data: Value) -> Self {
        let kind = EventKind::from_name(name);
        if kind.is_local() {
            return Self::Other { name: name.to_string(), data };
        }
        match kind {
            EventKind::NewMessage => Self::NewMessage(data),
            EventKind::MessageSent => typed(name, data, Self::MessageSent),
            EventKind::UserTyping => typed(name, data, Self::UserTyping),
            EventKind::UserStopTyping => typed(name, data, Self::UserStopTyping),
            EventKind::JoinedConversation => Self::JoinedConversation(data),
            EventKind::ConversationUpdated => Self::ConversationUpdated(data),
            EventKind::Error => Self::Error(data),
            EventKind::MessageError => Self::MessageError(data),
            EventKind::IncomingCall => Self::IncomingCall(data),
            EventKind::CallAccepted => Self::CallAccepted(data),
            EventKind::CallRejected => Self::CallRejected(data),
            EventKind::CallEnded => Self::CallEnded(data),
            _ => Self::Other { name: name.to_string(), data },
        }
    }

    /// The discriminant used for subscription.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect { .. } => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::ConnectError { .. } => EventKind::ConnectError,
            Self::ConnectionFailed { .. } => EventKind::ConnectionFailed,
            Self::SocketDisconnected(_) => EventKind::SocketDisconnected,
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::MessageSent(_) => EventKind::MessageSent,
            Self::UserTyping(_) => EventKind::UserTyping,
            Self::UserStopTyping(_) => EventKind::UserStopTyping,
            Self::JoinedConversation(_) => EventKind::JoinedConversation,
            Self::ConversationUpdated(_) => EventKind::ConversationUpdated,
            Self::Error(_) => EventKind::Error,
            Self::MessageError(_) => EventKind::MessageError,
            Self::IncomingCall(_) => EventKind::IncomingCall,
            Self::CallAccepted(_) => EventKind::CallAccepted,
            Self::CallRejected(_) => EventKind::CallRejected,
            Self::CallEnded(_) => EventKind::CallEnded,
            // A known name lands here only when its typed payload failed to
            // parse, and subscribers still expect it under that name.
            Self::Other { name, .. } => match EventKind::from_name(name) {
                kind if kind.is_local() => EventKind::Other(name.clone()),
                kind => kind,
            },
        }
    }

    /// Call id of a call signaling event.
    ///
    /// Servers send either the bare id string or an object with `callId`
    /// (or `_id`).
    pub fn call_id(&self) -> Option<&str> {
        let data = match self {
            Self::IncomingCall(v) | Self::CallAccepted(v) | Self::CallRejected(v) | Self::CallEnded(v) => v,
            _ => return None,
        };
        match data {
            Value::String(id) => Some(id.as_str()),
            Value::Object(map) => map
                .get("callId")
                .or_else(|| map.get("_id"))
                .and_then(Value::as_str),
            _ => None,
        }
    }

    /// The event's payload as JSON, for logging and generic consumers.
    pub fn payload(&self) -> Value {
        match self {
            Self::Connect { session_id } => json!({ "sessionId": session_id }),
            Self::Disconnect { reason } => Value::String(reason.to_string()),
            Self::ConnectError { message, attempt } => {
                json!({ "message": message, "attempt": attempt })
            }
            Self::ConnectionFailed { attempts } => json!({ "attempts": attempts }),
            Self::SocketDisconnected(params) => serde_json::to_value(params).unwrap_or(Value::Null),
            Self::MessageSent(ack) => serde_json::to_value(ack).unwrap_or(Value::Null),
            Self::UserTyping(p) | Self::UserStopTyping(p) => {
                serde_json::to_value(p).unwrap_or(Value::Null)
            }
            Self::NewMessage(v)
            | Self::JoinedConversation(v)
            | Self::ConversationUpdated(v)
            | Self::Error(v)
            | Self::MessageError(v)
            | Self::IncomingCall(v)
            | Self::CallAccepted(v)
            | Self::CallRejected(v)
            | Self::CallEnded(v) => v.clone(),
            Self::Other { data, .. } => data.clone(),
        }
    }

    /// Conversation id of a message, typing, or room event, when present.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Self::UserTyping(p) | Self::UserStopTyping(p) => Some(p.conversation_id.as_str()),
            Self::SocketDisconnected(params) => Some(params.conversation_id.as_str()),
            Self::NewMessage(v) | Self::JoinedConversation(v) | Self::ConversationUpdated(v) => v
                .get("conversationId")
                .or_else(|| v.get("conversation"))
                .and_then(Value::as_str),
            _ => None,
        }
    }
}

fn typed<T, F>(name: &str, data: Value, wrap: F) -> SocketEvent
where
    T: for<'de> Deserialize<'de>,
    F: FnOnce(T) -> SocketEvent,
{
    match serde_json::from_value::<T>(data.clone()) {
        Ok(payload) => wrap(payload),
        Err(e) => {
            warn!("unexpected {name} payload ({e}), forwarding untyped");
            SocketEvent::Other { name: name.to_string(), data }
        }
    }
}
