//! The `Command` trait.
//!
//! A command is the unit of work the executor runs: it declares the
//! entity ids it needs locked up front, then runs against a
//! [`Transaction`] snapshotting exactly those ids. Commands are not
//! required to be serializable — they run in-process, authored by
//! whatever game-logic layer sits above this crate, rather than
//! dispatched off a wire-level instruction set.

use crate::error::CommandOutcome;
use forge_concurrency::Transaction;

/// A unit of work executed under lock + transaction protection.
pub trait Command {
    /// Output produced on success.
    type Output;

    /// Entity ids this command needs exclusive access to, in any
    /// order — the executor sorts and deduplicates before acquiring.
    fn dependencies(&self) -> Vec<String>;

    /// Run the command body against `txn`.
    ///
    /// Every id returned by [`Command::dependencies`] is guaranteed to
    /// be in `txn`'s snapshot scope. Returning `Err` aborts the
    /// transaction (nothing staged here is applied); returning `Ok`
    /// lets the executor commit it.
    fn execute(&self, txn: &mut Transaction) -> CommandOutcome<Self::Output>;
}
