//! Snapshot transaction (T) over an [`EntityStore`].
//!
//! A transaction takes a point-in-time copy of the ids it's told to
//! touch, lets the caller read and stage writes against that copy, then
//! either applies every staged write atomically or discards them
//! entirely. Transactions do not acquire locks themselves — callers
//! pair a transaction with a [`crate::lock::LockManager`] acquisition
//! covering the same id set, the way `forge-executor` does.

use forge_core::{Entity, Error, Result};
use forge_storage::EntityStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle state of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Open for reads and staged writes.
    Active,
    /// Staged writes have been applied to the store.
    Committed,
    /// Staged writes were discarded; the store is untouched.
    RolledBack,
}

/// A buffered view over a subset of an [`EntityStore`]'s entities.
pub struct Transaction {
    store: Arc<EntityStore>,
    /// Point-in-time copy taken at `begin`, keyed by id.
    snapshot: HashMap<String, Option<Entity>>,
    /// Writes staged since `begin`; `None` means staged for deletion.
    pending: HashMap<String, Option<Entity>>,
    status: TransactionStatus,
}

impl Transaction {
    /// Begin a transaction snapshotting `ids` from `store`.
    ///
    /// Only ids named here may be read or written through this
    /// transaction; anything else returns [`Error::Internal`].
    pub fn begin(store: Arc<EntityStore>, ids: &[String]) -> Result<Self> {
        let mut snapshot = HashMap::with_capacity(ids.len());
        for id in ids {
            let current = store.get(id)?;
            snapshot.insert(id.clone(), current);
        }
        Ok(Transaction {
            store,
            snapshot,
            pending: HashMap::new(),
            status: TransactionStatus::Active,
        })
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status != TransactionStatus::Active {
            return Err(Error::Internal(format!(
                "transaction is not active: {:?}",
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_in_scope(&self, id: &str) -> Result<()> {
        if !self.snapshot.contains_key(id) {
            return Err(Error::Internal(format!(
                "id {id} was not included in this transaction's snapshot"
            )));
        }
        Ok(())
    }

    /// Read `id` as of the snapshot, reflecting any write already
    /// staged within this same transaction.
    pub fn get(&self, id: &str) -> Result<Option<Entity>> {
        self.ensure_active()?;
        self.ensure_in_scope(id)?;
        if let Some(staged) = self.pending.get(id) {
            return Ok(staged.clone());
        }
        Ok(self.snapshot.get(id).cloned().flatten())
    }

    /// Stage an upsert of `entity` under `id`. Not visible outside the
    /// transaction until [`Transaction::commit`].
    pub fn put(&mut self, id: &str, entity: Entity) -> Result<()> {
        self.ensure_active()?;
        self.ensure_in_scope(id)?;
        self.pending.insert(id.to_string(), Some(entity));
        Ok(())
    }

    /// Stage a deletion of `id`.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.ensure_active()?;
        self.ensure_in_scope(id)?;
        self.pending.insert(id.to_string(), None);
        Ok(())
    }

    /// Every id touched so far (read or written) in this transaction.
    pub fn touched_ids(&self) -> Vec<String> {
        self.snapshot.keys().cloned().collect()
    }

    /// Apply every staged write to the backing store.
    ///
    /// Each staged write goes through [`EntityStore::set`] /
    /// [`EntityStore::delete`], so a concurrent writer that mutated one
    /// of these ids between `begin` and `commit` still surfaces as a
    /// [`Error::VersionConflict`] here — pairing a transaction with a
    /// [`crate::lock::LockManager`] acquisition is what rules that race
    /// out in practice, this check is the backstop.
    ///
    /// On any failure, writes already applied in this commit call are
    /// not rolled back — callers running under a lock should treat a
    /// mid-commit failure as fatal to the surrounding command and rely
    /// on the lock, not this method, for atomicity across ids.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_active()?;
        let staged_count = self.pending.len();
        for (id, staged) in self.pending.drain() {
            match staged {
                Some(entity) => {
                    self.store.set(&id, entity)?;
                }
                None => {
                    self.store.delete(&id)?;
                }
            }
        }
        self.status = TransactionStatus::Committed;
        tracing::debug!(staged_count, "transaction committed");
        Ok(())
    }

    /// Discard every staged write; the store is left untouched.
    pub fn rollback(mut self) {
        self.pending.clear();
        self.status = TransactionStatus::RolledBack;
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TransactionStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(id: &str) -> Arc<EntityStore> {
        let store = Arc::new(EntityStore::new());
        store.set(id, Entity::new(id, "player")).unwrap();
        store
    }

    #[test]
    fn staged_write_is_invisible_until_commit() {
        let store = store_with("p1");
        let mut txn = Transaction::begin(store.clone(), &["p1".to_string()]).unwrap();

        let mut e = txn.get("p1").unwrap().unwrap();
        e.set_field("gold", 10i64);
        txn.put("p1", e).unwrap();

        assert!(store.get("p1").unwrap().unwrap().field("gold").is_none());
        txn.commit().unwrap();
        assert_eq!(
            store.get("p1").unwrap().unwrap().field("gold").unwrap().as_int(),
            Some(10)
        );
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let store = store_with("p1");
        let mut txn = Transaction::begin(store.clone(), &["p1".to_string()]).unwrap();
        let mut e = txn.get("p1").unwrap().unwrap();
        e.set_field("gold", 10i64);
        txn.put("p1", e).unwrap();
        txn.rollback();
        assert!(store.get("p1").unwrap().unwrap().field("gold").is_none());
    }

    #[test]
    fn reads_and_writes_outside_snapshot_scope_are_rejected() {
        let store = store_with("p1");
        let txn = Transaction::begin(store, &["p1".to_string()]).unwrap();
        assert!(txn.get("p2").is_err());
    }

    #[test]
    fn concurrent_mutation_surfaces_as_version_conflict_on_commit() {
        let store = store_with("p1");
        let mut txn = Transaction::begin(store.clone(), &["p1".to_string()]).unwrap();
        let mut e = txn.get("p1").unwrap().unwrap();
        e.set_field("gold", 10i64);
        txn.put("p1", e).unwrap();

        // Someone else commits a write to p1 in between.
        let mut outside = store.get("p1").unwrap().unwrap();
        outside.set_field("gold", 999i64);
        store.set("p1", outside).unwrap();

        assert!(txn.commit().is_err());
    }
}
