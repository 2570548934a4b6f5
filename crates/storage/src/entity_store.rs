//! `EntityStore`: the in-memory working set with lazy load-through and
//! optional write-through against a [`Repository`].

use crate::repository::Repository;
use dashmap::{DashMap, DashSet};
use forge_core::{Entity, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory working set of entities, transparently backed by a
/// [`Repository`] for read-through and (optionally) write-through.
///
/// Cloning an `EntityStore` is cheap and shares the same working set —
/// clone it the way you'd clone an `Arc`. Used directly by
/// [`crate::repository::Repository`]-agnostic callers and wrapped by
/// `forge-concurrency::Transaction` for per-command snapshots.
pub struct EntityStore {
    working: DashMap<String, Entity>,
    /// Ids a repository lookup has already confirmed absent, so
    /// `get`/`get_bulk` never re-issue the same round trip.
    resolved_absent: DashSet<String>,
    repository: Option<Arc<dyn Repository>>,
    write_through: bool,
}

impl EntityStore {
    /// A store with no backing repository: pure in-memory, `set` never
    /// persists on its own (call `flush` explicitly if one is attached
    /// later via [`EntityStore::with_repository`]).
    pub fn new() -> Self {
        EntityStore {
            working: DashMap::new(),
            resolved_absent: DashSet::new(),
            repository: None,
            write_through: false,
        }
    }

    /// A store backed by `repository`. `write_through` controls whether
    /// `set`/`delete` persist immediately or only land in the working
    /// set until an explicit [`EntityStore::flush`].
    pub fn with_repository(repository: Arc<dyn Repository>, write_through: bool) -> Self {
        EntityStore {
            working: DashMap::new(),
            resolved_absent: DashSet::new(),
            repository: Some(repository),
            write_through,
        }
    }

    /// Current working record for `id`, loading through the repository
    /// on first access if one is attached.
    pub fn get(&self, id: &str) -> Result<Option<Entity>> {
        if let Some(e) = self.working.get(id) {
            return Ok(Some(e.clone()));
        }
        if self.resolved_absent.contains(id) {
            return Ok(None);
        }
        let Some(repo) = &self.repository else {
            return Ok(None);
        };
        match repo.load(id)? {
            Some(e) => {
                self.working.insert(id.to_string(), e.clone());
                Ok(Some(e))
            }
            None => {
                self.resolved_absent.insert(id.to_string());
                Ok(None)
            }
        }
    }

    /// Bulk fetch. Ids already cached (present or confirmed absent) are
    /// served from memory; the remainder are fetched from the
    /// repository in a single round trip. An empty `ids` performs zero
    /// repository calls.
    pub fn get_bulk(&self, ids: &[String]) -> Result<HashMap<String, Entity>> {
        let mut out = HashMap::with_capacity(ids.len());
        let mut unresolved = Vec::new();

        for id in ids {
            if let Some(e) = self.working.get(id) {
                out.insert(id.clone(), e.clone());
            } else if !self.resolved_absent.contains(id) {
                unresolved.push(id.clone());
            }
        }

        if !unresolved.is_empty() {
            if let Some(repo) = &self.repository {
                let fetched = repo.load_bulk(&unresolved)?;
                for id in &unresolved {
                    match fetched.get(id) {
                        Some(e) => {
                            self.working.insert(id.clone(), e.clone());
                            out.insert(id.clone(), e.clone());
                        }
                        None => {
                            self.resolved_absent.insert(id.clone());
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Upsert `entity` into the working set.
    ///
    /// Enforces the same version semantics a repository would: insert
    /// defaults to version 1 (or the caller's version, if set to
    /// something else deliberately), update requires the caller's
    /// version to match what's cached and bumps by exactly one.
    ///
    /// With write-through enabled, the version check and bump are left
    /// entirely to the attached [`Repository::save`] — it performs the
    /// same check against its own stored copy, so doing it here too
    /// would double-apply the bump and make the repository's own check
    /// fail against a version it never actually stored. Only in batch
    /// mode (`write_through = false`, or no repository attached) does
    /// this method own the check and bump itself, since nothing else
    /// will until the next `flush`.
    pub fn set(&self, id: &str, entity: Entity) -> Result<Entity> {
        let mut resolved = entity;
        resolved.id = id.to_string();

        if self.write_through {
            if let Some(repo) = &self.repository {
                let saved = repo.save(resolved)?;
                self.resolved_absent.remove(id);
                self.working.insert(id.to_string(), saved.clone());
                return Ok(saved);
            }
        }

        match self.get(id)? {
            None => {
                // First write: version already defaults to INITIAL via
                // Entity::new, but honor an explicit caller value.
            }
            Some(ref existing) => {
                if existing.version != resolved.version {
                    return Err(Error::VersionConflict {
                        id: id.to_string(),
                        expected: resolved.version.0,
                        actual: existing.version.0,
                    });
                }
                resolved.version = resolved.version.next();
                // Preserve the type tag once set.
                resolved.type_tag = existing.type_tag.clone();
            }
        }

        self.resolved_absent.remove(id);
        self.working.insert(id.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Remove `id` from the working set (and, if write-through is on,
    /// from the repository). Idempotent.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.working.remove(id);
        self.resolved_absent.insert(id.to_string());
        if self.write_through {
            if let Some(repo) = &self.repository {
                repo.delete(id)?;
            }
        }
        Ok(())
    }

    /// True if `get(id)` would return `Some`.
    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Count of entities currently resident in the working set.
    pub fn count(&self) -> usize {
        self.working.len()
    }

    /// Ids of every cached entity whose `type_tag` equals `type_tag`.
    /// Operates over the working set only, not the full repository.
    pub fn by_type(&self, type_tag: &str) -> Vec<String> {
        self.working
            .iter()
            .filter(|e| e.type_tag == type_tag)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Drop the entire working set (repository, if any, is untouched).
    pub fn clear(&self) {
        self.working.clear();
        self.resolved_absent.clear();
    }

    /// Persist every cached entity to the repository. Used in
    /// write-through-disabled (batch) mode; a no-op without an attached
    /// repository.
    pub fn flush(&self) -> Result<()> {
        let Some(repo) = &self.repository else {
            return Ok(());
        };
        let snapshot: Vec<Entity> = self.working.iter().map(|e| e.clone()).collect();
        for entity in snapshot {
            let id = entity.id.clone();
            let saved = repo.save(entity)?;
            self.working.insert(id, saved);
        }
        Ok(())
    }

    /// Drop `id` from the cache and re-read it from the repository.
    pub fn reload(&self, id: &str) -> Result<Option<Entity>> {
        self.working.remove(id);
        self.resolved_absent.remove(id);
        self.get(id)
    }

    /// Materialize the entire working set as a plain map. Used by
    /// `forge-concurrency::Transaction` to snapshot S.
    pub fn snapshot_map(&self) -> HashMap<String, Entity> {
        self.working
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Atomically replace the working set with `map`. Used by
    /// `Transaction::commit`.
    pub fn replace_map(&self, map: HashMap<String, Entity>) {
        self.working.clear();
        for (id, entity) in map {
            self.working.insert(id, entity);
        }
        self.resolved_absent.clear();
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_repository::MemoryRepository;

    #[test]
    fn set_then_get_returns_written_record() {
        let store = EntityStore::new();
        let e = store.set("p1", Entity::new("p1", "player")).unwrap();
        assert_eq!(e.version.0, 1);
        assert_eq!(store.get("p1").unwrap().unwrap().version.0, 1);
    }

    #[test]
    fn get_bulk_empty_makes_zero_repository_calls() {
        let store = EntityStore::with_repository(Arc::new(MemoryRepository::new()), true);
        let result = store.get_bulk(&[]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn get_bulk_does_not_refetch_resolved_ids() {
        let repo = Arc::new(MemoryRepository::new());
        repo.save(Entity::new("p1", "player")).unwrap();
        let store = EntityStore::with_repository(repo.clone(), true);

        // First bulk load resolves p1 and caches the miss for p2.
        let ids = vec!["p1".to_string(), "p2".to_string()];
        let first = store.get_bulk(&ids).unwrap();
        assert_eq!(first.len(), 1);

        // Deleting from the repository directly (bypassing the store)
        // must not affect what the cache already resolved.
        repo.delete("p1").unwrap();
        let second = store.get_bulk(&ids).unwrap();
        assert_eq!(second.len(), 1, "cached hit for p1 must not be re-fetched");
    }

    #[test]
    fn delete_twice_is_a_noop() {
        let store = EntityStore::new();
        store.set("p1", Entity::new("p1", "player")).unwrap();
        store.delete("p1").unwrap();
        store.delete("p1").unwrap();
        assert!(!store.exists("p1").unwrap());
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = EntityStore::new();
        store.set("p1", Entity::new("p1", "player")).unwrap();
        let stale = Entity::new("p1", "player");
        assert!(store.set("p1", stale).is_err());
    }

    #[test]
    fn write_through_persists_to_repository() {
        let repo = Arc::new(MemoryRepository::new());
        let store = EntityStore::with_repository(repo.clone(), true);
        store.set("p1", Entity::new("p1", "player")).unwrap();
        assert!(repo.exists("p1").unwrap());
    }

    #[test]
    fn write_through_second_update_does_not_double_bump_the_version() {
        let repo = Arc::new(MemoryRepository::new());
        let store = EntityStore::with_repository(repo.clone(), true);
        let first = store.set("p1", Entity::new("p1", "player")).unwrap();
        assert_eq!(first.version.0, 1);

        let second = store.set("p1", first).unwrap();
        assert_eq!(second.version.0, 2);
        assert_eq!(repo.load("p1").unwrap().unwrap().version.0, 2);

        let third = store.set("p1", second).unwrap();
        assert_eq!(third.version.0, 3);
    }

    #[test]
    fn flush_persists_batched_writes() {
        let repo = Arc::new(MemoryRepository::new());
        let store = EntityStore::with_repository(repo.clone(), false);
        store.set("p1", Entity::new("p1", "player")).unwrap();
        assert!(!repo.exists("p1").unwrap());
        store.flush().unwrap();
        assert!(repo.exists("p1").unwrap());
    }

    #[test]
    fn reload_drops_cache_and_rereads() {
        let repo = Arc::new(MemoryRepository::new());
        let store = EntityStore::with_repository(repo.clone(), true);
        store.set("p1", Entity::new("p1", "player")).unwrap();
        repo.save(store.get("p1").unwrap().unwrap()).unwrap();
        let reloaded = store.reload("p1").unwrap().unwrap();
        assert_eq!(reloaded.version.0, 2);
    }
}
