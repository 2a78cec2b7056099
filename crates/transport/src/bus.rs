//! Local subscriber registry.

use engine_core::{MessageType, TransportMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback invoked for every delivered message of a subscribed type.
pub type Handler = Arc<dyn Fn(&TransportMessage) + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&TransportMessage) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<MessageType, Vec<(u64, Handler)>>,
}

/// Per-type handler lists shared by a transport and its subscriptions.
///
/// Handlers run synchronously on the dispatching task with no lock held,
/// so a handler may subscribe or unsubscribe. A handler must not call back
/// into the component that published the message.
#[derive(Clone, Default)]
pub struct SubscriberBus {
    registry: Arc<Mutex<Registry>>,
}

impl SubscriberBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, message_type: MessageType, handler: Handler) -> Subscription {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(message_type)
            .or_default()
            .push((id, handler));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            message_type,
            id,
        }
    }

    /// Delivers `message` to every handler of its type. Returns how many
    /// handlers ran.
    pub fn dispatch(&self, message: &TransportMessage) -> usize {
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock();
            match registry.handlers.get(&message.message_type) {
                Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
                None => return 0,
            }
        };

        for handler in &handlers {
            handler(message);
        }

        debug!(
            message_type = message.message_type.as_str(),
            handlers = handlers.len(),
            "Dispatched message"
        );
        handlers.len()
    }

    pub fn subscriber_count(&self, message_type: MessageType) -> usize {
        self.registry
            .lock()
            .handlers
            .get(&message_type)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by `subscribe`. Dropping it keeps the handler
/// registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    message_type: MessageType,
    id: u64,
}

impl Subscription {
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        if let Some(list) = registry.handlers.get_mut(&self.message_type) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                registry.handlers.remove(&self.message_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn message(message_type: MessageType) -> TransportMessage {
        TransportMessage::new(message_type, serde_json::json!({}), 0)
    }

    #[test]
    fn test_dispatch_by_type() {
        let bus = SubscriberBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = bus.subscribe(
            MessageType::GoalCompletion,
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(bus.dispatch(&message(MessageType::GoalCompletion)), 1);
        assert_eq!(bus.dispatch(&message(MessageType::VisitorUpdate)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let bus = SubscriberBus::new();
        let first = bus.subscribe(MessageType::SystemStatus, handler(|_| {}));
        let _second = bus.subscribe(MessageType::SystemStatus, handler(|_| {}));
        assert_eq!(bus.subscriber_count(MessageType::SystemStatus), 2);

        first.unsubscribe();
        assert_eq!(bus.subscriber_count(MessageType::SystemStatus), 1);
    }

    #[test]
    fn test_handler_may_subscribe_during_dispatch() {
        let bus = SubscriberBus::new();
        let inner = bus.clone();
        let _sub = bus.subscribe(
            MessageType::ErrorReport,
            handler(move |_| {
                let _ = inner.subscribe(MessageType::ErrorReport, handler(|_| {}));
            }),
        );
        bus.dispatch(&message(MessageType::ErrorReport));
        assert_eq!(bus.subscriber_count(MessageType::ErrorReport), 2);
    }
}
