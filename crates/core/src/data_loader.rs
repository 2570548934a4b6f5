//! The `DataLoader` collaborator.
//!
//! The core consumes read-only, categorical access to content records
//! (mob/item/card templates); it never loads or validates the content
//! itself. A minimal in-memory implementation is provided for tests and
//! for callers that don't need file-backed content.

use crate::entity::Entity;
use std::collections::HashMap;

/// Read-only access to externally authored content, keyed by category
/// then id. Loading is assumed to have succeeded before first use; the
/// core does not model schema validation.
pub trait DataLoader: Send + Sync {
    /// Fetch a single record by category and id.
    fn get(&self, category: &str, id: &str) -> Option<Entity>;

    /// Fetch every record in a category.
    fn get_all(&self, category: &str) -> Vec<Entity>;
}

/// A `DataLoader` backed by an in-memory map, for tests and small
/// embedders that don't need a file-backed content pipeline.
#[derive(Debug, Default, Clone)]
pub struct StaticDataLoader {
    categories: HashMap<String, HashMap<String, Entity>>,
}

impl StaticDataLoader {
    /// An empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record under `category`/`id`.
    pub fn insert(&mut self, category: impl Into<String>, record: Entity) {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(record.id.clone(), record);
    }
}

impl DataLoader for StaticDataLoader {
    fn get(&self, category: &str, id: &str) -> Option<Entity> {
        self.categories.get(category)?.get(id).cloned()
    }

    fn get_all(&self, category: &str) -> Vec<Entity> {
        self.categories
            .get(category)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_for_unknown_category() {
        let loader = StaticDataLoader::new();
        assert!(loader.get("mob", "goblin").is_none());
        assert!(loader.get_all("mob").is_empty());
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let mut loader = StaticDataLoader::new();
        loader.insert("mob", Entity::new("goblin_warrior", "mob_template"));
        assert!(loader.get("mob", "goblin_warrior").is_some());
        assert_eq!(loader.get_all("mob").len(), 1);
    }
}
