//! # forge-scheduler
//!
//! Cooperative one-shot and recurring task scheduling on dedicated OS
//! threads, matching the rest of the engine's blocking-thread
//! concurrency model.

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerConfig, TaskCallback};
