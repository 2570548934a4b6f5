//! The saga orchestrator (G): an ordered list of [`SagaStep`]s run
//! against an [`Executor`], with automatic compensation on failure.
//!
//! Modeled after the multi-entity "fusion" flows that combine several
//! owned items into one (consume N inputs, produce one output): each
//! input consumption and the final production is its own step, so a
//! mid-flow failure (e.g. the output item can't be created) unwinds
//! the already-consumed inputs instead of leaving them half spent.

use crate::step::SagaStep;
use forge_executor::{CommandOutcome, ErrorKind, Executor};

/// Outcome of a completed saga run.
#[derive(Debug)]
pub enum SagaOutcome {
    /// Every step executed successfully.
    Completed,
    /// A step failed and every prior step's compensation ran
    /// successfully; the saga's effects are fully undone.
    Failed {
        /// Name of the step that failed.
        failed_step: String,
        /// The error that step returned.
        error: ErrorKind,
    },
    /// A step failed and at least one compensation itself failed.
    /// Affected entities may be left in an inconsistent state; this
    /// needs operator attention, not just a client-facing retry.
    CriticalFailure {
        /// Name of the step that failed.
        failed_step: String,
        /// The error that step returned.
        error: ErrorKind,
        /// Names of steps whose compensation did not complete.
        uncompensated_steps: Vec<String>,
    },
}

impl SagaOutcome {
    /// True if the saga's effects are known to be fully undone (either
    /// nothing failed, or everything that did fail was compensated).
    pub fn is_consistent(&self) -> bool {
        !matches!(self, SagaOutcome::CriticalFailure { .. })
    }
}

/// An ordered sequence of steps run as a unit: all succeed, or
/// everything that already ran gets compensated.
pub struct Saga {
    name: String,
    steps: Vec<Box<dyn SagaStep>>,
}

impl Saga {
    /// A saga named `name` with no steps yet.
    pub fn new(name: impl Into<String>) -> Self {
        Saga {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step, to run after everything already added.
    pub fn then(mut self, step: impl SagaStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Run every step in order against `executor`.
    ///
    /// On the first step failure, every already-succeeded step's
    /// `compensate` runs in reverse order. If a compensation call
    /// itself fails, execution continues compensating the remaining
    /// steps (so one bad compensation doesn't leave the rest
    /// un-attempted), and the overall outcome is reported as
    /// [`SagaOutcome::CriticalFailure`].
    pub fn run(&self, executor: &Executor) -> SagaOutcome {
        let mut succeeded: Vec<&Box<dyn SagaStep>> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            tracing::debug!(saga = %self.name, step = step.name(), "running saga step");
            match step.execute(executor) {
                Ok(()) => succeeded.push(step),
                Err(error) => {
                    tracing::warn!(
                        saga = %self.name,
                        step = step.name(),
                        error = %error,
                        "saga step failed, compensating"
                    );
                    return self.compensate(executor, succeeded, step.name().to_string(), error);
                }
            }
        }

        SagaOutcome::Completed
    }

    fn compensate(
        &self,
        executor: &Executor,
        succeeded: Vec<&Box<dyn SagaStep>>,
        failed_step: String,
        error: ErrorKind,
    ) -> SagaOutcome {
        let mut uncompensated = Vec::new();

        for step in succeeded.into_iter().rev() {
            if let Err(comp_err) = step.compensate(executor) {
                tracing::error!(
                    saga = %self.name,
                    step = step.name(),
                    error = %comp_err,
                    "compensation failed; saga left in an uncompensated state"
                );
                uncompensated.push(step.name().to_string());
            }
        }

        if uncompensated.is_empty() {
            SagaOutcome::Failed { failed_step, error }
        } else {
            SagaOutcome::CriticalFailure {
                failed_step,
                error,
                uncompensated_steps: uncompensated,
            }
        }
    }
}

/// Precondition helper for status-gated saga steps: fail fast with
/// [`ErrorKind::Validation`] if the entity named by `id` doesn't
/// currently carry `expected` as its `status` field.
pub fn require_status(
    executor: &Executor,
    id: &str,
    expected: forge_core::Status,
) -> CommandOutcome<()> {
    let entity = executor
        .store()
        .get(id)
        .map_err(ErrorKind::from)?
        .ok_or_else(|| ErrorKind::NotFound(id.to_string()))?;

    if entity.has_status(expected) {
        Ok(())
    } else {
        Err(ErrorKind::Validation(format!(
            "{id} is not in the required state {}",
            expected.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::ClosureStep;
    use forge_core::{Entity, Status};
    use forge_storage::EntityStore;
    use std::sync::Arc;

    fn executor_with(ids: &[&str]) -> Executor {
        let store = Arc::new(EntityStore::new());
        for id in ids {
            store.set(id, Entity::new(*id, "item")).unwrap();
        }
        Executor::new(store)
    }

    #[test]
    fn all_steps_succeed_reports_completed() {
        let exec = executor_with(&["a"]);
        let saga = Saga::new("noop").then(ClosureStep::new(
            "touch-a",
            |_e| Ok(()),
            |_e| Ok(()),
        ));
        assert!(matches!(saga.run(&exec), SagaOutcome::Completed));
    }

    #[test]
    fn failure_compensates_prior_steps_in_reverse_order() {
        let exec = executor_with(&["a", "b"]);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let o1 = order.clone();
        let step_a = ClosureStep::new(
            "consume-a",
            move |_e| Ok(()),
            move |_e| {
                o1.lock().unwrap().push("undo-a");
                Ok(())
            },
        );

        let o2 = order.clone();
        let step_b = ClosureStep::new(
            "consume-b",
            move |_e| Ok(()),
            move |_e| {
                o2.lock().unwrap().push("undo-b");
                Ok(())
            },
        );

        let step_c = ClosureStep::new(
            "produce-output",
            |_e| Err(ErrorKind::Validation("no room for output".to_string())),
            |_e| Ok(()),
        );

        let saga = Saga::new("fuse").then(step_a).then(step_b).then(step_c);
        let outcome = saga.run(&exec);

        match outcome {
            SagaOutcome::Failed { failed_step, .. } => assert_eq!(failed_step, "produce-output"),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(*order.lock().unwrap(), vec!["undo-b", "undo-a"]);
    }

    #[test]
    fn compensation_failure_is_reported_as_critical() {
        let exec = executor_with(&["a"]);
        let step_a = ClosureStep::new(
            "consume-a",
            |_e| Ok(()),
            |_e| Err(ErrorKind::Internal("rollback storage unavailable".to_string())),
        );
        let step_b = ClosureStep::new("fail", |_e| Err(ErrorKind::Validation("nope".to_string())), |_e| Ok(()));

        let saga = Saga::new("fuse").then(step_a).then(step_b);
        let outcome = saga.run(&exec);

        assert!(!outcome.is_consistent());
        match outcome {
            SagaOutcome::CriticalFailure { uncompensated_steps, .. } => {
                assert_eq!(uncompensated_steps, vec!["consume-a".to_string()]);
            }
            other => panic!("expected CriticalFailure, got {other:?}"),
        }
    }

    #[test]
    fn require_status_rejects_wrong_state() {
        let exec = executor_with(&["a"]);
        assert!(require_status(&exec, "a", Status::Locked).is_err());
    }

    #[test]
    fn require_status_accepts_matching_state() {
        let exec = executor_with(&["a"]);
        let mut e = exec.store().get("a").unwrap().unwrap();
        e.set_status(Status::Active);
        exec.store().set("a", e).unwrap();
        assert!(require_status(&exec, "a", Status::Active).is_ok());
    }
}
