//! Publish/subscribe registry decoupling the transport from its consumers.
//!
//! Two ways to listen are offered:
//! - named callbacks registered with [`EventRegistry::on`] and removed with
//!   [`EventRegistry::off`], dispatched in registration order on a background
//!   task so a callback never runs inside the registry's own bookkeeping;
//! - a tokio broadcast channel from [`EventRegistry::subscribe`] that sees
//!   every event, for consumers that prefer message passing.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::events::{EventKind, SocketEvent};

/// A subscriber callback. Identity (for [`EventRegistry::off`]) is the `Arc` pointer.
pub type Listener = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&SocketEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One emitted event with the callbacks that were registered when it was emitted.
struct Dispatch {
    event: SocketEvent,
    listeners: Vec<Listener>,
}

/// Listener table plus broadcast fan-out.
///
/// Cloning yields another handle to the same table. Must be created inside
/// a tokio runtime: construction spawns the dispatch task, which exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct EventRegistry {
    listeners: Arc<Mutex<HashMap<EventKind, Vec<Listener>>>>,
    queue: mpsc::UnboundedSender<Dispatch>,
    sender: broadcast::Sender<SocketEvent>,
}

impl EventRegistry {
    /// Create a registry whose broadcast channel holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatch(rx));

        Self {
            listeners: Arc::new(Mutex::new(HashMap::new())),
            queue,
            sender,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Listener>>> {
        // Callbacks never run under this lock, so a poisoned guard still
        // holds a consistent table.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `listener` for `kind`. Duplicates are kept.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        debug!("listener added for {kind}");
        self.table().entry(kind).or_default().push(listener);
    }

    /// Remove the first registration of `listener` for `kind`, if any.
    pub fn off(&self, kind: &EventKind, listener: &Listener) {
        let mut table = self.table();
        if let Some(list) = table.get_mut(kind) {
            if let Some(pos) = list.iter().position(|l| Arc::ptr_eq(l, listener)) {
                list.remove(pos);
                debug!("listener removed for {kind}");
            }
            if list.is_empty() {
                table.remove(kind);
            }
        }
    }

    /// Publish an event to callbacks and broadcast subscribers.
    ///
    /// Callbacks registered at this moment are queued for the dispatch task;
    /// nothing runs inline.
    pub fn emit(&self, event: SocketEvent) {
        let kind = event.kind();
        let listeners = self.table().get(&kind).cloned().unwrap_or_default();

        match self.sender.send(event.clone()) {
            Ok(count) => debug!("dispatched {kind} to {count} subscriber(s)"),
            Err(_) => debug!("no channel subscribers for event {kind}"),
        }

        if !listeners.is_empty() && self.queue.send(Dispatch { event, listeners }).is_err() {
            warn!("dispatch task has stopped; dropping callbacks for {kind}");
        }
    }

    /// Receive every event through a broadcast channel.
    ///
    /// Slow consumers that fall behind receive `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.sender.subscribe()
    }

    /// Drop every registered callback.
    pub fn clear(&self) {
        self.table().clear();
    }

    /// Number of callbacks registered for `kind`.
    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.table().get(kind).map_or(0, Vec::len)
    }

    /// Whether no callback is registered for any event.
    pub fn is_empty(&self) -> bool {
        self.table().values().all(Vec::is_empty)
    }

    /// Number of live broadcast receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

async fn run_dispatch(mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(Dispatch { event, listeners }) = rx.recv().await {
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!("listener for {} panicked", event.kind());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::events::TypingPayload;

    fn typing_event() -> SocketEvent {
        SocketEvent::UserTyping(TypingPayload {
            conversation_id: "c1".into(),
            user_id: "u1".into(),
        })
    }

    /// Yield until the dispatch task has drained its queue.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_callbacks_run_in_registration_order() {
        let registry = EventRegistry::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            registry.on(
                EventKind::UserTyping,
                listener(move |_| seen.lock().unwrap().push(tag)),
            );
        }

        registry.emit(typing_event());
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dispatch_is_deferred() {
        let registry = EventRegistry::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.on(
            EventKind::UserTyping,
            listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.emit(typing_event());
        // Current-thread runtime: the dispatch task has not been polled yet.
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_off_before_emit_prevents_delivery() {
        let registry = EventRegistry::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let cb = listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.on(EventKind::UserTyping, cb.clone());
        registry.off(&EventKind::UserTyping, &cb);
        registry.emit(typing_event());
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registrations_are_kept_and_removed_one_at_a_time() {
        let registry = EventRegistry::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let cb = listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.on(EventKind::NewMessage, cb.clone());
        registry.on(EventKind::NewMessage, cb.clone());
        assert_eq!(registry.listener_count(&EventKind::NewMessage), 2);

        registry.off(&EventKind::NewMessage, &cb);
        assert_eq!(registry.listener_count(&EventKind::NewMessage), 1);

        registry.emit(SocketEvent::NewMessage(serde_json::json!({"_id": "m1"})));
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_off_unknown_listener_is_noop() {
        let registry = EventRegistry::new(16);
        let registered = listener(|_| {});
        let stranger = listener(|_| {});
        registry.on(EventKind::CallEnded, registered);
        registry.off(&EventKind::CallEnded, &stranger);
        registry.off(&EventKind::CallAccepted, &stranger);
        assert_eq!(registry.listener_count(&EventKind::CallEnded), 1);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_others() {
        let registry = EventRegistry::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        registry.on(EventKind::UserTyping, listener(|_| panic!("listener bug")));
        registry.on(
            EventKind::UserTyping,
            listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.emit(typing_event());
        registry.emit(typing_event());
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_listeners_only_see_their_event() {
        let registry = EventRegistry::new(16);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.on(
            EventKind::CallEnded,
            listener(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.emit(typing_event());
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_receive_everything() {
        let registry = EventRegistry::new(16);
        let mut rx = registry.subscribe();
        assert_eq!(registry.subscriber_count(), 1);

        registry.emit(typing_event());
        registry.emit(SocketEvent::ConnectionFailed { attempts: 10 });

        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::UserTyping);
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::ConnectionFailed);
    }

    #[tokio::test]
    async fn test_clear_empties_the_table() {
        let registry = EventRegistry::new(16);
        registry.on(EventKind::NewMessage, listener(|_| {}));
        registry.on(EventKind::CallEnded, listener(|_| {}));
        assert!(!registry.is_empty());

        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.listener_count(&EventKind::NewMessage), 0);
    }
}
