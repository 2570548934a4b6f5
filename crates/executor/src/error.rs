//! The error kinds a command result can carry.
//!
//! Every failure surfaced to a caller of [`crate::Executor::execute`] is
//! reduced to one of these kinds. Lower layers (`forge-core`,
//! `forge-storage`, `forge-concurrency`) have their own, more detailed
//! error types; [`ErrorKind::from`] impls below collapse them onto this
//! fixed, client-facing set.
//!
//! # Categories
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `Validation` | Command input was rejected before anything ran |
//! | `NotFound` | A referenced entity does not exist |
//! | `Conflict` | Optimistic version check failed |
//! | `LockTimeout` | Could not acquire the locks a command needed in time |
//! | `Internal` | Unexpected failure; the bug is in us, not the caller |
//! | `SagaFailed` | A saga aborted and its compensations ran cleanly |
//! | `SagaCritical` | A saga aborted and at least one compensation itself failed |
//! | `SchedulerFailed` | A scheduled task's callback returned an error |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-facing error kind for a failed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ErrorKind {
    /// Command input failed validation before execution began.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An optimistic-concurrency version check failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Locks required by the command could not be acquired in time.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// A saga aborted; every compensation for its completed steps ran.
    #[error("saga failed: {0}")]
    SagaFailed(String),

    /// A saga aborted and at least one compensation itself failed,
    /// leaving affected entities in an unknown state.
    #[error("saga critical failure: {0}")]
    SagaCritical(String),

    /// A scheduled task's callback returned an error.
    #[error("scheduler task failed: {0}")]
    SchedulerFailed(String),
}

impl ErrorKind {
    /// True for kinds where retrying the same command has a realistic
    /// chance of succeeding (conflicts and lock timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict(_) | ErrorKind::LockTimeout(_))
    }
}

impl From<forge_core::Error> for ErrorKind {
    fn from(err: forge_core::Error) -> Self {
        match err {
            forge_core::Error::NotFound(id) => ErrorKind::NotFound(id),
            forge_core::Error::VersionConflict { id, expected, actual } => ErrorKind::Conflict(
                format!("{id}: expected version {expected}, found {actual}"),
            ),
            forge_core::Error::MalformedField { id, field, reason } => {
                ErrorKind::Validation(format!("{id}.{field}: {reason}"))
            }
            forge_core::Error::ReferralCycle { referrer, referred } => ErrorKind::Validation(
                format!("referral from {referrer} to {referred} would create a cycle"),
            ),
            forge_core::Error::Internal(msg) => ErrorKind::Internal(msg),
        }
    }
}

impl From<forge_concurrency::LockError> for ErrorKind {
    fn from(err: forge_concurrency::LockError) -> Self {
        ErrorKind::LockTimeout(err.to_string())
    }
}

/// Result alias used by [`crate::Command::execute`] implementations.
pub type CommandOutcome<T> = std::result::Result<T, ErrorKind>;
