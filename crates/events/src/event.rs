//! The `Event` envelope published on the bus.

use chrono::{DateTime, Utc};
use forge_core::Value;
use serde::{Deserialize, Serialize};

/// A single published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dot-separated topic name, e.g. `"player.leveled_up"`.
    pub topic: String,
    /// Event body. Shape is a per-topic convention, not enforced here.
    pub payload: Value,
    /// When the event was published.
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Construct an event stamped with the current time.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Event {
            topic: topic.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}
