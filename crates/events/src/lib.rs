//! # forge-events
//!
//! The synchronous, topic-based event bus and its bounded diagnostic
//! history, plus pity-counter bookkeeping for gacha-style pulls.

pub mod bus;
pub mod event;
pub mod pity;

pub use bus::{EventBus, EventHandler, DEFAULT_HISTORY_CAPACITY};
pub use event::Event;
pub use pity::PityTracker;
