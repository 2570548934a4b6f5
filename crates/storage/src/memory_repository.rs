//! Reference [`Repository`] implementation: a single-process, in-memory
//! table-oriented store.
//!
//! An id-primary table plus a type index: a `HashMap<String, Entity>`
//! guarded by a single `RwLock` plus a `type_tag -> ids` index for
//! `list_by_type`. A file- or SQL-backed repository would swap the
//! lock/map pair for its own engine while keeping this same trait
//! surface.

use crate::repository::{not_found, would_cycle, ReferralStats, ReferralTree, Repository};
use forge_core::{Entity, Error, Result, Status};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Table {
    records: FxHashMap<String, Entity>,
    by_type: FxHashMap<String, HashSet<String>>,
    referrer_of: FxHashMap<String, String>,
    referrals_of: FxHashMap<String, Vec<String>>,
}

/// In-memory reference repository. Cheap to construct, safe to share
/// behind an `Arc` across threads.
#[derive(Default)]
pub struct MemoryRepository {
    table: RwLock<Table>,
}

impl MemoryRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn save(&self, mut entity: Entity) -> Result<Entity> {
        let mut table = self.table.write();
        match table.records.get(&entity.id) {
            Some(existing) => {
                if existing.version != entity.version {
                    return Err(Error::VersionConflict {
                        id: entity.id.clone(),
                        expected: entity.version.0,
                        actual: existing.version.0,
                    });
                }
                // The stored type tag is never silently changed, even
                // if the caller's copy disagrees with what's on record.
                let stored_type = existing.type_tag.clone();
                entity.version = entity.version.next();
                entity.type_tag = stored_type;

                table
                    .by_type
                    .entry(entity.type_tag.clone())
                    .or_default()
                    .insert(entity.id.clone());
                table.records.insert(entity.id.clone(), entity.clone());
                Ok(entity)
            }
            None => {
                table
                    .by_type
                    .entry(entity.type_tag.clone())
                    .or_default()
                    .insert(entity.id.clone());
                table.records.insert(entity.id.clone(), entity.clone());
                Ok(entity)
            }
        }
    }

    fn load(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self.table.read().records.get(id).cloned())
    }

    fn load_bulk(&self, ids: &[String]) -> Result<HashMap<String, Entity>> {
        let table = self.table.read();
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(e) = table.records.get(id) {
                out.insert(id.clone(), e.clone());
            }
        }
        Ok(out)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut table = self.table.write();
        if let Some(removed) = table.records.remove(id) {
            if let Some(ids) = table.by_type.get_mut(&removed.type_tag) {
                ids.remove(id);
            }
        }
        Ok(())
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.table.read().records.contains_key(id))
    }

    fn list_by_type(&self, type_tag: &str) -> Result<Vec<String>> {
        Ok(self
            .table
            .read()
            .by_type
            .get(type_tag)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.table.read().records.len())
    }

    fn clear(&self) -> Result<()> {
        let mut table = self.table.write();
        table.records.clear();
        table.by_type.clear();
        table.referrer_of.clear();
        table.referrals_of.clear();
        Ok(())
    }

    fn add_referral(&self, referrer: &str, referred: &str) -> Result<bool> {
        let mut table = self.table.write();

        if !table.records.contains_key(referrer) {
            return Err(not_found(referrer));
        }
        if !table.records.contains_key(referred) {
            return Err(not_found(referred));
        }
        if table.referrer_of.contains_key(referred) {
            return Ok(false);
        }
        if would_cycle(referrer, referred, |id| table.referrer_of.get(id).cloned()) {
            return Err(Error::ReferralCycle {
                referrer: referrer.to_string(),
                referred: referred.to_string(),
            });
        }

        table.referrer_of.insert(referred.to_string(), referrer.to_string());
        table
            .referrals_of
            .entry(referrer.to_string())
            .or_default()
            .push(referred.to_string());
        Ok(true)
    }

    fn get_referrer(&self, id: &str) -> Result<Option<String>> {
        Ok(self.table.read().referrer_of.get(id).cloned())
    }

    fn get_direct_referrals(&self, id: &str) -> Result<Vec<String>> {
        Ok(self
            .table
            .read()
            .referrals_of
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_referral_tree(&self, root: &str, depth: usize, include_stats: bool) -> Result<ReferralTree> {
        let table = self.table.read();

        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut frontier = vec![root.to_string()];
        for _ in 0..depth {
            let mut next = Vec::new();
            for id in &frontier {
                if let Some(children) = table.referrals_of.get(id) {
                    next.extend(children.iter().cloned());
                }
            }
            if next.is_empty() {
                break;
            }
            levels.push(next.clone());
            frontier = next;
        }

        let total_referrals: usize = levels.iter().map(|l| l.len()).sum();
        let direct_referrals = levels.first().cloned().unwrap_or_default();

        let stats = if include_stats {
            let mut total_members = 0usize;
            let mut active_members = 0usize;
            for level in &levels {
                for id in level {
                    total_members += 1;
                    let is_active = table
                        .records
                        .get(id)
                        .and_then(|e| e.status())
                        .map(|s| s == Status::Active)
                        .unwrap_or(true);
                    if is_active {
                        active_members += 1;
                    }
                }
            }
            Some(ReferralStats {
                total_members,
                active_members,
            })
        } else {
            None
        };

        Ok(ReferralTree {
            player_id: root.to_string(),
            direct_referrals,
            levels,
            total_referrals,
            stats,
        })
    }
}
