//! # forge-executor
//!
//! The command execution layer: a [`Command`] trait, the [`Executor`]
//! that runs commands under lock + transaction protection, and the
//! client-facing [`ErrorKind`] every failure is reduced to.

pub mod command;
pub mod error;
pub mod executor;

pub use command::Command;
pub use error::{CommandOutcome, ErrorKind};
pub use executor::{Executor, ExecutorConfig, DEFAULT_LOCK_TIMEOUT};
