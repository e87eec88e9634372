//! Integration tests for outbound intents and inbound event routing.
//!
//! Covers room membership, typing indicators, the message send path with
//! its `socket_disconnected` fallback, call signaling in both directions,
//! and forwarding of server events to subscribers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use crew_socket::{
    listener, EventKind, OutboundFrame, SendMessageParams, SocketEvent, StaticCredentialStore,
};
use serde_json::json;

// ---- rooms ----

#[tokio::test]
async fn e2e_join_and_leave_emit_when_connected() {
    let mut h = Harness::new(logged_in_store());
    let mut session = h.connected().await;

    assert!(h.manager.join_conversation("conv-1", None));
    let (event, data) = session.next_emit().await;
    assert_eq!(event, "join_conversation");
    assert_eq!(data, json!({"conversationId": "conv-1", "userId": "user-ann"}));

    assert!(h.manager.join_conversation("conv-2", Some("someone")));
    let (_, data) = session.next_emit().await;
    assert_eq!(data["userId"], "someone");

    assert!(h.manager.leave_conversation("conv-1"));
    let (event, data) = session.next_emit().await;
    assert_eq!(event, "leave_conversation");
    assert_eq!(data, json!({"conversationId": "conv-1"}));
}

#[tokio::test]
async fn e2e_join_while_disconnected_is_dropped() {
    let mut h = Harness::new(logged_in_store());
    let mut events = h.manager.subscribe();

    assert!(!h.manager.join_conversation("conv-1", None));
    assert!(!h.manager.leave_conversation("conv-1"));
    assert!(!h.manager.start_typing("conv-1", "user-ann"));
    settle().await;
    assert!(events.try_recv().is_err());

    // Nothing was queued for later either.
    let mut session = h.connected().await;
    assert!(session.try_frame().is_none());
}

#[tokio::test]
async fn e2e_join_while_connecting_is_dropped() {
    let mut h = Harness::new(logged_in_store());
    h.manager.connect(None).await;
    let mut session = h.next_session().await;

    assert!(!h.manager.join_conversation("conv-1", None));
    session.accept();
    wait_for_state(&h.manager, crew_socket::ConnectionState::Connected).await;
    assert!(session.try_frame().is_none());
}

#[tokio::test]
async fn e2e_join_without_any_user_id_sends_null() {
    let store = Arc::new(StaticCredentialStore::new(Some("tok".into()), None));
    let mut h = Harness::new(store);
    let mut session = h.connected().await;

    assert!(h.manager.join_conversation("conv-1", None));
    let (_, data) = session.next_emit().await;
    assert!(data["userId"].is_null());
}

#[tokio::test]
async fn e2e_rooms_are_not_rejoined_after_reconnect() {
    let mut h = Harness::new(logged_in_store());
    let mut first = h.connected().await;
    h.manager.join_conversation("conv-1", None);
    first.next_emit().await;

    first.close(crew_socket::DisconnectReason::TransportClose);
    let mut second = h.next_session().await;
    second.accept();
    wait_for_state(&h.manager, crew_socket::ConnectionState::Connected).await;
    settle().await;
    assert!(second.try_frame().is_none());
}

#[tokio::test]
async fn e2e_typing_indicators_emit_when_connected() {
    let mut h = Harness::new(logged_in_store());
    let mut session = h.connected().await;

    assert!(h.manager.start_typing("conv-1", "user-ann"));
    assert!(h.manager.stop_typing("conv-1", "user-ann"));

    let (event, data) = session.next_emit().await;
    assert_eq!(event, "typing_start");
    assert_eq!(data, json!({"conversationId": "conv-1", "userId": "user-ann"}));
    let (event, _) = session.next_emit().await;
    assert_eq!(event, "typing_stop");
}

// ---- send_message ----

#[tokio::test]
async fn e2e_send_while_disconnected_reports_socket_disconnected_once() {
    let h = Harness::new(logged_in_store());
    let fallbacks = record(&h.manager, EventKind::SocketDisconnected);

    let params = SendMessageParams::new("conv-1", "hello", "user-ann").with_message_id("local-1");
    assert!(!h.manager.send_message(params.clone()));
    settle().await;

    let seen = fallbacks.lock().unwrap();
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        SocketEvent::SocketDisconnected(original) => assert_eq!(original, &params),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn e2e_send_while_connected_uses_cached_identity() {
    let mut h = Harness::new(logged_in_store());
    let fallbacks = record(&h.manager, EventKind::SocketDisconnected);
    let mut session = h.connected().await;

    let params = SendMessageParams::new("conv-1", "hello", "ignored-id").with_sender_name("Zed Q");
    assert!(h.manager.send_message(params));

    let (event, data) = session.next_emit().await;
    assert_eq!(event, "send_message");
    assert_eq!(data["conversationId"], "conv-1");
    let message = &data["message"];
    assert_eq!(message["content"], "hello");
    assert_eq!(message["sender"]["_id"], "user-ann");
    assert_eq!(message["sender"]["firstName"], "Ann");
    assert_eq!(message["sender"]["avatar"], "https://cdn.example.com/ann.png");
    assert!(message["_id"].as_str().unwrap().starts_with("temp-"));

    settle().await;
    assert!(fallbacks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn e2e_send_without_profile_builds_sender_from_params() {
    let store = Arc::new(StaticCredentialStore::new(Some("tok".into()), None));
    let mut h = Harness::new(store);
    let mut session = h.connected().await;

    let params = SendMessageParams::new("conv-1", "hi", "user-9").with_sender_name("Mary Ann Smith");
    assert!(h.manager.send_message(params));

    let (_, data) = session.next_emit().await;
    assert_eq!(
        data["message"]["sender"],
        json!({"_id": "user-9", "firstName": "Mary", "lastName": "Ann Smith"})
    );
}

#[tokio::test]
async fn e2e_message_acknowledgments_are_forwarded() {
    let mut h = Harness::new(logged_in_store());
    let mut events = h.manager.subscribe();
    let session = h.connected().await;

    session.push("message_sent", json!({"messageId": "local-1", "sender": {"_id": "user-ann"}}));
    match wait_for_event(&mut events, EventKind::MessageSent).await {
        SocketEvent::MessageSent(ack) => {
            assert_eq!(ack.message_id, "local-1");
            assert_eq!(ack.sender["_id"], "user-ann");
        }
        other => panic!("unexpected event {other:?}"),
    }

    session.push("message_error", json!({"message": "conversation archived"}));
    match wait_for_event(&mut events, EventKind::MessageError).await {
        SocketEvent::MessageError(data) => assert_eq!(data["message"], "conversation archived"),
        other => panic!("unexpected event {other:?}"),
    }
}

// ---- calls ----

#[tokio::test]
async fn e2e_call_intents_send_the_call_id() {
    let mut h = Harness::new(logged_in_store());
    let mut session = h.connected().await;

    assert!(h.manager.accept_call("call-1"));
    assert!(h.manager.reject_call("call-2"));
    assert!(h.manager.end_call("call-3"));

    let expected = [("accept_call", "call-1"), ("reject_call", "call-2"), ("end_call", "call-3")];
    for (name, id) in expected {
        let (event, data) = session.next_emit().await;
        assert_eq!(event, name);
        assert_eq!(data, json!(id));
    }
}

#[tokio::test]
async fn e2e_initiate_call_notification_passes_payload_through() {
    let mut h = Harness::new(logged_in_store());
    let mut session = h.connected().await;

    let payload = json!({"callId": "call-9", "conversationId": "conv-1", "type": "video"});
    assert!(h.manager.initiate_call_notification(&payload));
    let (event, data) = session.next_emit().await;
    assert_eq!(event, "initiate_call");
    assert_eq!(data, payload);
}

#[tokio::test]
async fn e2e_call_intents_require_a_connection() {
    let mut h = Harness::new(logged_in_store());
    assert!(!h.manager.accept_call("call-1"));
    assert!(!h.manager.end_call("call-1"));
    assert!(!h.manager.initiate_call_notification(&json!({"callId": "call-1"})));

    let mut session = h.connected().await;
    assert!(session.try_frame().is_none());
}

#[tokio::test]
async fn e2e_inbound_call_events_reach_their_subscribers() {
    let mut h = Harness::new(logged_in_store());
    let incoming = record(&h.manager, EventKind::IncomingCall);
    let ended = record(&h.manager, EventKind::CallEnded);
    let session = h.connected().await;

    session.push("incoming_call", json!({"callId": "call-5", "caller": {"firstName": "Bo"}}));
    session.push("call_ended", json!("call-5"));
    settle().await;

    let incoming = incoming.lock().unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].call_id(), Some("call-5"));
    let ended = ended.lock().unwrap();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].call_id(), Some("call-5"));
}

// ---- inbound routing ----

#[tokio::test]
async fn e2e_inbound_events_dispatch_in_registration_order() {
    let mut h = Harness::new(logged_in_store());
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    for tag in ["a", "b"] {
        let order = order.clone();
        h.manager.on(
            EventKind::NewMessage,
            listener(move |event| {
                if let SocketEvent::NewMessage(data) = event {
                    order.lock().unwrap().push(format!("{tag}:{}", data["_id"].as_str().unwrap_or("")));
                }
            }),
        );
    }
    let session = h.connected().await;

    session.push("new_message", json!({"_id": "m1", "conversationId": "conv-1"}));
    session.push("new_message", json!({"_id": "m2", "conversationId": "conv-1"}));
    settle().await;

    assert_eq!(*order.lock().unwrap(), vec!["a:m1", "b:m1", "a:m2", "b:m2"]);
}

#[tokio::test]
async fn e2e_unknown_and_typing_events_are_forwarded_by_name() {
    let mut h = Harness::new(logged_in_store());
    let presence = record(&h.manager, EventKind::Other("presence_changed".into()));
    let typing = record(&h.manager, EventKind::UserTyping);
    let session = h.connected().await;

    session.push("presence_changed", json!({"userId": "u2", "online": true}));
    session.push("user_typing", json!({"conversationId": "conv-1", "userId": "u2"}));
    settle().await;

    assert_eq!(presence.lock().unwrap().len(), 1);
    let typing = typing.lock().unwrap();
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].conversation_id(), Some("conv-1"));
}

#[tokio::test]
async fn e2e_removed_listener_stops_receiving() {
    let mut h = Harness::new(logged_in_store());
    let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = hits.clone();
    let cb = listener(move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    });
    h.manager.on(EventKind::ConversationUpdated, cb.clone());
    let session = h.connected().await;

    session.push("conversation_updated", json!({"conversationId": "conv-1"}));
    settle().await;
    h.manager.off(&EventKind::ConversationUpdated, &cb);
    session.push("conversation_updated", json!({"conversationId": "conv-1"}));
    settle().await;

    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn e2e_writes_stop_after_disconnect() {
    let mut h = Harness::new(logged_in_store());
    let mut session = h.connected().await;
    h.manager.disconnect();
    assert_eq!(session.next_frame().await, Some(OutboundFrame::Close));

    assert!(!h.manager.join_conversation("conv-1", None));
    assert!(!h.manager.accept_call("call-1"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(session.try_frame().is_none());
}
