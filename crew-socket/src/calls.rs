//! Call signaling relay.
//!
//! Outbound call intents are one-way and only sent while connected. Inbound
//! `incoming_call`, `call_accepted`, `call_rejected` and `call_ended` arrive
//! through the registry like any other event.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::events::outbound;
use crate::manager::ConnectionManager;

impl ConnectionManager {
    pub fn accept_call(&self, call_id: &str) -> bool {
        self.call_intent(outbound::ACCEPT_CALL, call_id)
    }

    pub fn reject_call(&self, call_id: &str) -> bool {
        self.call_intent(outbound::REJECT_CALL, call_id)
    }

    pub fn end_call(&self, call_id: &str) -> bool {
        self.call_intent(outbound::END_CALL, call_id)
    }

    /// Tell the server a call was started; the payload is passed through as-is.
    pub fn initiate_call_notification<T: Serialize>(&self, payload: &T) -> bool {
        match serde_json::to_value(payload) {
            Ok(data) => self.emit_if_connected(outbound::INITIATE_CALL, data),
            Err(e) => {
                warn!("could not serialize call notification: {e}");
                false
            }
        }
    }

    fn call_intent(&self, event: &str, call_id: &str) -> bool {
        let sent = self.emit_if_connected(event, Value::String(call_id.to_string()));
        if !sent {
            info!("cannot send {event} for call {call_id}: socket not connected");
        }
        sent
    }
}
