//! # forge-saga
//!
//! The saga orchestrator: ordered steps with automatic compensation,
//! run against a [`forge_executor::Executor`].

pub mod saga;
pub mod step;

pub use saga::{require_status, Saga, SagaOutcome};
pub use step::{ClosureStep, SagaStep};
