//! # forge-storage
//!
//! Entity persistence: the [`Repository`] trait, its in-memory reference
//! implementation, and the [`EntityStore`] working set that sits between
//! callers and a repository.

pub mod entity_store;
pub mod memory_repository;
pub mod repository;

pub use entity_store::EntityStore;
pub use memory_repository::MemoryRepository;
pub use repository::{ReferralStats, ReferralTree, Repository};
