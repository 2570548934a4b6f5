//! # forge-core
//!
//! Foundational types shared across the engine: the entity envelope, its
//! field value universe, the error type every higher layer converts
//! into, and the `DataLoader` collaborator interface.
//!
//! Nothing in this crate touches storage, locking, or execution — those
//! concerns live in `forge-storage`, `forge-concurrency`, and
//! `forge-executor` respectively.

pub mod data_loader;
pub mod entity;
pub mod error;
pub mod value;

pub use data_loader::{DataLoader, StaticDataLoader};
pub use entity::{Entity, Status, Version};
pub use error::{Error, Result};
pub use value::Value;
