//! # forge-concurrency
//!
//! Per-entity locking and snapshot transactions: the two collaborators
//! `forge-executor` composes around every command.

pub mod lock;
pub mod transaction;

pub use lock::{LockError, LockGuard, LockManager, LockManagerConfig};
pub use transaction::{Transaction, TransactionStatus};
