//! Conversation room membership and typing indicators.
//!
//! Intents are fire-and-forget and only reach the server while connected.
//! Nothing is queued and joined rooms are not tracked locally, so after a
//! reconnect the caller has to join again.

use serde_json::json;
use tracing::info;

use crate::events::outbound;
use crate::manager::ConnectionManager;

impl ConnectionManager {
    /// Join a conversation room.
    ///
    /// `user_id` defaults to the cached profile, then to the credential user id.
    pub fn join_conversation(&self, conversation_id: &str, user_id: Option<&str>) -> bool {
        let user_id = user_id.map(str::to_string).or_else(|| self.user_id());
        let sent = self.emit_if_connected(
            outbound::JOIN_CONVERSATION,
            json!({ "conversationId": conversation_id, "userId": user_id }),
        );
        if !sent {
            info!("cannot join conversation {conversation_id}: socket not connected");
        }
        sent
    }

    /// Leave a conversation room.
    pub fn leave_conversation(&self, conversation_id: &str) -> bool {
        let sent = self.emit_if_connected(
            outbound::LEAVE_CONVERSATION,
            json!({ "conversationId": conversation_id }),
        );
        if !sent {
            info!("cannot leave conversation {conversation_id}: socket not connected");
        }
        sent
    }

    pub fn start_typing(&self, conversation_id: &str, user_id: &str) -> bool {
        self.emit_if_connected(
            outbound::TYPING_START,
            json!({ "conversationId": conversation_id, "userId": user_id }),
        )
    }

    pub fn stop_typing(&self, conversation_id: &str, user_id: &str) -> bool {
        self.emit_if_connected(
            outbound::TYPING_STOP,
            json!({ "conversationId": conversation_id, "userId": user_id }),
        )
    }
}
