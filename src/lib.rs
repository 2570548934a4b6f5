//! # forgecore
//!
//! A transactional, multi-user game engine core: a versioned entity
//! store with pluggable persistence, per-entity locking, snapshot
//! transactions, a command executor, a saga orchestrator with
//! compensations, a synchronous event bus, a cooperative task
//! scheduler, and two representative services built on top of them.
//!
//! # Quick start
//!
//! ```no_run
//! use forgecore::{Entity, EntityStore, Executor, Command, CommandOutcome};
//! use forgecore::concurrency::Transaction;
//! use std::sync::Arc;
//!
//! struct Deposit { account: String, amount: i64 }
//!
//! impl Command for Deposit {
//!     type Output = i64;
//!
//!     fn dependencies(&self) -> Vec<String> {
//!         vec![self.account.clone()]
//!     }
//!
//!     fn execute(&self, txn: &mut Transaction) -> CommandOutcome<i64> {
//!         let mut entity = txn
//!             .get(&self.account)
//!             .map_err(forgecore::ErrorKind::from)?
//!             .unwrap_or_else(|| Entity::new(&self.account, "account"));
//!         let balance = entity.field("balance").and_then(|v| v.as_int()).unwrap_or(0) + self.amount;
//!         entity.set_field("balance", balance);
//!         txn.put(&self.account, entity).map_err(forgecore::ErrorKind::from)?;
//!         Ok(balance)
//!     }
//! }
//!
//! let store = Arc::new(EntityStore::new());
//! let executor = Executor::new(store);
//! let balance = executor.execute(&Deposit { account: "p1".into(), amount: 100 }).unwrap();
//! assert_eq!(balance, 100);
//! ```
//!
//! # Layout
//!
//! | Crate | Covers |
//! |-------|--------|
//! | `forge-core` | Entity envelope, field values, error type, `DataLoader` |
//! | `forge-storage` | `Repository` trait, in-memory reference impl, `EntityStore` working set |
//! | `forge-concurrency` | Per-entity `LockManager`, snapshot `Transaction` |
//! | `forge-executor` | `Command` trait, `Executor`, client-facing `ErrorKind` |
//! | `forge-saga` | `Saga` orchestrator with compensation |
//! | `forge-events` | Synchronous `EventBus`, pity-counter tracking |
//! | `forge-scheduler` | Cooperative one-shot and recurring task scheduling |
//! | `forge-services` | `RaidService`, `BannerManager` |
//!
//! Each crate above is also usable standalone; this crate just wires
//! the common path together and re-exports the public surface most
//! callers need.

pub use forge_core::{DataLoader, Entity, Error, Result, StaticDataLoader, Status, Value, Version};
pub use forge_storage::{EntityStore, MemoryRepository, ReferralStats, ReferralTree, Repository};
pub use forge_executor::{Command, CommandOutcome, ErrorKind, Executor, ExecutorConfig, DEFAULT_LOCK_TIMEOUT};
pub use forge_saga::{require_status, ClosureStep, Saga, SagaOutcome, SagaStep};
pub use forge_events::{Event, EventBus, EventHandler, PityTracker, DEFAULT_HISTORY_CAPACITY};
pub use forge_scheduler::{Scheduler, SchedulerConfig, TaskCallback};
pub use forge_services::{
    AttackResult, BannerManager, BannerPhase, BannerSpec, RaidPhase, RaidService, DEFAULT_PITY_THRESHOLD,
    MAX_ATTACK_RETRIES,
};

/// Lower-level collaborators not re-exported at the crate root, for
/// callers that need to name their types explicitly (e.g. in a
/// [`Command::execute`] signature).
pub mod concurrency {
    pub use forge_concurrency::{
        LockError, LockGuard, LockManager, LockManagerConfig, Transaction, TransactionStatus,
    };
}
