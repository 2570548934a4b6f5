//! Error types shared by every layer of the engine.
//!
//! Each crate above `forge-core` defines its own error enum and converts
//! into this one at its public boundary (see `forge-executor::ErrorKind`
//! for the mapping onto the command-result error kinds clients see).

use thiserror::Error;

/// Result type alias used throughout `forge-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or writing entities.
#[derive(Debug, Error)]
pub enum Error {
    /// No record exists for the given id.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// The caller's `_version` did not match the currently stored version.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Entity id the conflict occurred on.
        id: String,
        /// Version the caller presented.
        expected: u64,
        /// Version currently persisted.
        actual: u64,
    },

    /// A field was present but held a value of the wrong shape.
    #[error("malformed field {field} on entity {id}: {reason}")]
    MalformedField {
        /// Entity id.
        id: String,
        /// Field name.
        field: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Creating a referral link would introduce a cycle in the referral graph.
    #[error("referral cycle: {referred} is already an ancestor of {referrer}")]
    ReferralCycle {
        /// Proposed referrer.
        referrer: String,
        /// Proposed referred id.
        referred: String,
    },

    /// Catch-all for unexpected failures that should still surface typed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if retrying the same operation has a chance of succeeding.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }
}
