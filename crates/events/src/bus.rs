//! The event bus (B): synchronous, topic-based pub/sub with a bounded
//! diagnostic history.
//!
//! Publish is synchronous and in-process: every subscribed handler
//! runs on the publisher's own thread, in subscription order, before
//! `publish` returns. There is no queue and no retry — a handler that
//! wants asynchrony should hand work off itself (e.g. to
//! `forge-scheduler`).

use crate::event::Event;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Default number of recent events retained for diagnostics.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Narrow capability handed to event subscribers: the ability to
/// observe an event, nothing else. Handlers cannot publish, subscribe,
/// or otherwise reach back into the bus from inside a callback.
pub trait EventHandler: Send + Sync {
    /// Called once per matching published event, synchronously.
    fn handle(&self, event: &Event);
}

struct Subscription {
    topic: String,
    handler: Arc<dyn EventHandler>,
}

/// Synchronous topic-based event bus.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    history: RwLock<VecDeque<Event>>,
    history_capacity: usize,
}

impl EventBus {
    /// A bus with the default history capacity.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// A bus retaining up to `capacity` recent events.
    pub fn with_history_capacity(capacity: usize) -> Self {
        EventBus {
            subscriptions: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            history_capacity: capacity,
        }
    }

    /// Subscribe `handler` to `topic`. Exact-match only; there is no
    /// wildcard or hierarchical topic matching.
    pub fn subscribe(&self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.subscriptions.write().push(Subscription {
            topic: topic.into(),
            handler,
        });
    }

    /// Remove a previously registered subscription, identified by
    /// `Arc` pointer identity rather than by a separately issued
    /// subscription id.
    pub fn unsubscribe(&self, topic: &str, handler: &Arc<dyn EventHandler>) {
        self.subscriptions.write().retain(|sub| {
            !(sub.topic == topic && Arc::ptr_eq(&sub.handler, handler))
        });
    }

    /// Drop subscriptions. `topic = Some(t)` clears only `t`'s
    /// subscribers; `None` clears every topic. History is untouched.
    pub fn clear_subscribers(&self, topic: Option<&str>) {
        match topic {
            Some(topic) => self.subscriptions.write().retain(|sub| sub.topic != topic),
            None => self.subscriptions.write().clear(),
        }
    }

    /// Publish `event`, synchronously invoking every handler subscribed
    /// to its topic in subscription order, then appending it to the
    /// bounded history ring buffer.
    ///
    /// A handler that panics is caught and logged; delivery continues
    /// to its remaining siblings rather than aborting the publish.
    pub fn publish(&self, event: Event) {
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| sub.topic == event.topic)
            .map(|sub| sub.handler.clone())
            .collect();

        for handler in &handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(&event)));
            if let Err(panic) = outcome {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(topic = %event.topic, error = %message, "event handler panicked");
            }
        }

        tracing::debug!(topic = %event.topic, subscriber_count = handlers.len(), "event published");

        if self.history_capacity > 0 {
            let mut history = self.history.write();
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(event);
        }
    }

    /// Number of active subscriptions across all topics.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Most recent `n` events across all topics, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Event> {
        let history = self.history.read();
        history.iter().rev().take(n).rev().cloned().collect()
    }

    /// Most recent `n` events on `topic`, oldest first.
    pub fn recent_for_topic(&self, topic: &str, n: usize) -> Vec<Event> {
        let history = self.history.read();
        history
            .iter()
            .filter(|e| e.topic == topic)
            .rev()
            .take(n)
            .rev()
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);
    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn subscribers_receive_only_their_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn EventHandler> = Arc::new(CountingHandler(hits.clone()));
        bus.subscribe("player.leveled_up", handler);

        bus.publish(Event::new("player.leveled_up", Value::Null));
        bus.publish(Event::new("player.died", Value::Null));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_by_identity_stops_future_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handler: Arc<dyn EventHandler> = Arc::new(CountingHandler(hits.clone()));
        bus.subscribe("topic", handler.clone());
        bus.publish(Event::new("topic", Value::Null));
        bus.unsubscribe("topic", &handler);
        bus.publish(Event::new("topic", Value::Null));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn history_is_bounded_and_drops_oldest() {
        let bus = EventBus::with_history_capacity(2);
        bus.publish(Event::new("a", Value::Int(1)));
        bus.publish(Event::new("a", Value::Int(2)));
        bus.publish(Event::new("a", Value::Int(3)));

        let recent = bus.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload, Value::Int(2));
        assert_eq!(recent[1].payload, Value::Int(3));
    }

    #[test]
    fn clear_subscribers_with_no_topic_removes_every_topic() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("a", Arc::new(CountingHandler(hits.clone())));
        bus.subscribe("b", Arc::new(CountingHandler(hits.clone())));
        bus.clear_subscribers(None);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn clear_subscribers_with_a_topic_leaves_others_intact() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("a", Arc::new(CountingHandler(hits.clone())));
        bus.subscribe("b", Arc::new(CountingHandler(hits.clone())));
        bus.clear_subscribers(Some("a"));
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(Event::new("a", Value::Null));
        bus.publish(Event::new("b", Value::Null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    struct PanickingHandler;
    impl EventHandler for PanickingHandler {
        fn handle(&self, _event: &Event) {
            panic!("handler blew up");
        }
    }

    #[test]
    fn a_panicking_handler_does_not_stop_delivery_to_siblings() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        bus.subscribe("topic", Arc::new(PanickingHandler));
        bus.subscribe("topic", Arc::new(CountingHandler(hits.clone())));

        bus.publish(Event::new("topic", Value::Null));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
