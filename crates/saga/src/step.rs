//! A single saga step: a forward action paired with its compensation.

use forge_executor::{CommandOutcome, Executor};

/// One step of a [`crate::saga::Saga`].
///
/// A step's `compensate` is only ever invoked after its `execute` has
/// already succeeded, and at most once per run.
pub trait SagaStep: Send + Sync {
    /// Name used in logging and in the saga's failure report.
    fn name(&self) -> &str;

    /// Run this step's forward action.
    fn execute(&self, executor: &Executor) -> CommandOutcome<()>;

    /// Undo this step's effect. Called only for steps whose `execute`
    /// already returned `Ok`, in reverse order, when a later step in
    /// the same saga fails.
    fn compensate(&self, executor: &Executor) -> CommandOutcome<()>;
}

/// Adapt a pair of closures into a [`SagaStep`] without a dedicated
/// type — convenient for simple, locally defined steps.
pub struct ClosureStep<E, C> {
    name: String,
    execute: E,
    compensate: C,
}

impl<E, C> ClosureStep<E, C>
where
    E: Fn(&Executor) -> CommandOutcome<()> + Send + Sync,
    C: Fn(&Executor) -> CommandOutcome<()> + Send + Sync,
{
    /// Build a step named `name` from its forward and compensating
    /// closures.
    pub fn new(name: impl Into<String>, execute: E, compensate: C) -> Self {
        ClosureStep {
            name: name.into(),
            execute,
            compensate,
        }
    }
}

impl<E, C> SagaStep for ClosureStep<E, C>
where
    E: Fn(&Executor) -> CommandOutcome<()> + Send + Sync,
    C: Fn(&Executor) -> CommandOutcome<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, executor: &Executor) -> CommandOutcome<()> {
        (self.execute)(executor)
    }

    fn compensate(&self, executor: &Executor) -> CommandOutcome<()> {
        (self.compensate)(executor)
    }
}
