//! The Executor (X) — single entry point for running [`Command`]s.
//!
//! The executor is stateless: it holds shared references to the
//! entity store and lock manager but keeps no state of its own. All
//! state lives in those collaborators. `Executor` is `Send + Sync` and
//! meant to be shared across worker threads behind an `Arc`.

use crate::command::Command;
use crate::error::{CommandOutcome, ErrorKind};
use forge_concurrency::{LockManager, Transaction};
use forge_storage::EntityStore;
use std::sync::Arc;
use std::time::Duration;

/// Default time an [`Executor::execute`] call will wait to acquire a
/// command's locks before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for an [`Executor`].
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Time an `execute` call waits to acquire a command's locks.
    pub lock_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    /// A short lock timeout so deadlocked tests fail fast.
    pub fn for_testing() -> Self {
        ExecutorConfig {
            lock_timeout: Duration::from_millis(200),
        }
    }
}

/// Runs commands under lock + transaction protection.
pub struct Executor {
    store: Arc<EntityStore>,
    locks: Arc<LockManager>,
    lock_timeout: Duration,
}

impl Executor {
    /// An executor over `store`, with its own fresh lock manager.
    pub fn new(store: Arc<EntityStore>) -> Self {
        Executor {
            store,
            locks: Arc::new(LockManager::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// An executor sharing an existing lock manager — used when
    /// multiple executors (e.g. one per service) must serialize
    /// against the same entities.
    pub fn with_lock_manager(store: Arc<EntityStore>, locks: Arc<LockManager>) -> Self {
        Executor {
            store,
            locks,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// An executor built from an explicit [`ExecutorConfig`], sharing
    /// `locks` with any other executor constructed the same way.
    pub fn with_config(store: Arc<EntityStore>, locks: Arc<LockManager>, config: ExecutorConfig) -> Self {
        Executor {
            store,
            locks,
            lock_timeout: config.lock_timeout,
        }
    }

    /// Override the lock-acquisition timeout (default 5s).
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Run a single command: acquire its locks, snapshot its
    /// dependencies into a transaction, execute, then commit on
    /// success or roll back on failure, releasing locks either way.
    pub fn execute<C: Command>(&self, cmd: &C) -> CommandOutcome<C::Output> {
        let mut ids = cmd.dependencies();
        ids.sort();
        ids.dedup();

        let guard = self
            .locks
            .acquire(&ids, self.lock_timeout)
            .map_err(ErrorKind::from)?;

        let mut txn = Transaction::begin(self.store.clone(), &ids).map_err(ErrorKind::from)?;

        let result = cmd.execute(&mut txn);

        match result {
            Ok(output) => {
                txn.commit().map_err(ErrorKind::from)?;
                drop(guard);
                Ok(output)
            }
            Err(err) => {
                txn.rollback();
                drop(guard);
                tracing::debug!(error = %err, "command execution failed, transaction rolled back");
                Err(err)
            }
        }
    }

    /// Run every command in `cmds` concurrently, one OS thread per
    /// command, returning results in the same order as the input.
    ///
    /// Commands that touch disjoint id sets run in parallel; commands
    /// that share ids serialize through [`LockManager`] the way any two
    /// concurrent callers would. Panics inside a command body are
    /// caught per-thread and surfaced as `ErrorKind::Internal`.
    pub fn execute_batch<C: Command + Sync>(&self, cmds: &[C]) -> Vec<CommandOutcome<C::Output>>
    where
        C::Output: Send,
    {
        std::thread::scope(|scope| {
            let handles: Vec<_> = cmds
                .iter()
                .map(|cmd| scope.spawn(|| self.execute(cmd)))
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(ErrorKind::Internal(
                            "command thread panicked".to_string(),
                        ))
                    })
                })
                .collect()
        })
    }

    /// Shared handle to the underlying entity store, for callers that
    /// need direct reads outside of a command (e.g. query endpoints).
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Shared handle to the lock manager.
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }
}
