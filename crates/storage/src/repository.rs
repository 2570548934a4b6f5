//! The `Repository` collaborator.
//!
//! Durable entity storage, consumed through a trait so the engine never
//! assumes a concrete backing store. [`crate::memory_repository::MemoryRepository`]
//! is the reference implementation; any implementation that honors the
//! version-check contract on `save` is acceptable.

use forge_core::{Entity, Error, Result};
use std::collections::HashMap;

/// Aggregated view of a referral subtree, as returned by
/// [`Repository::get_referral_tree`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferralTree {
    /// Root of the traversal.
    pub player_id: String,
    /// Immediate referrals of `player_id`.
    pub direct_referrals: Vec<String>,
    /// Every id reachable within `depth` levels, one `Vec` per level
    /// (`levels[0]` is the direct referrals, `levels[1]` their
    /// referrals, and so on).
    pub levels: Vec<Vec<String>>,
    /// Total count of ids across all levels.
    pub total_referrals: usize,
    /// Present only when the traversal was asked to include stats.
    pub stats: Option<ReferralStats>,
}

/// Aggregate stats over a referral subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferralStats {
    /// Total members across all traversed levels.
    pub total_members: usize,
    /// Members whose `status` field is `active` (or absent).
    pub active_members: usize,
}

/// Durable key → record store with per-key optimistic version checking.
///
/// Implementations must be safe under concurrent use (Send + Sync); the
/// engine relies on this and does not serialize repository calls beyond
/// what `EntityStore`/`LockManager` already provide.
pub trait Repository: Send + Sync {
    /// Upsert `entity`.
    ///
    /// On update, `entity.version` must equal the version currently
    /// stored; on mismatch this returns [`Error::VersionConflict`] and
    /// storage is unchanged. On success the returned entity carries the
    /// new stored version: `caller_version + 1` on update,
    /// `entity.version` as given on insert.
    ///
    /// The stored `type_tag` is never silently changed once set: on
    /// update, the entity's original `type_tag` is preserved even if
    /// `entity.type_tag` differs.
    fn save(&self, entity: Entity) -> Result<Entity>;

    /// Fetch a single record with its current version attached.
    fn load(&self, id: &str) -> Result<Option<Entity>>;

    /// Fetch every existing record among `ids` in a single round trip.
    /// Ids with no stored record are simply absent from the result.
    fn load_bulk(&self, ids: &[String]) -> Result<HashMap<String, Entity>>;

    /// Remove a record. Idempotent: deleting an absent id is a no-op.
    fn delete(&self, id: &str) -> Result<()>;

    /// True if a record exists for `id`.
    fn exists(&self, id: &str) -> Result<bool>;

    /// Every id whose stored `type_tag` equals `type_tag`.
    fn list_by_type(&self, type_tag: &str) -> Result<Vec<String>>;

    /// Total number of stored records.
    fn count(&self) -> Result<usize>;

    /// Remove every stored record. Destructive; used by tests and
    /// batch-reset tooling.
    fn clear(&self) -> Result<()>;

    /// Link `referred` to `referrer`.
    ///
    /// Returns `Ok(true)` if newly linked, `Ok(false)` if `referred`
    /// already has a referrer (link rejected, not an error — the
    /// caller decides whether that's a problem). Returns
    /// [`Error::ReferralCycle`] if `referrer` is already a descendant
    /// of `referred` in the referral graph, since linking them would
    /// close a loop. Cycle rejection is mandatory, not optional.
    fn add_referral(&self, referrer: &str, referred: &str) -> Result<bool>;

    /// The player who referred `id`, if any.
    fn get_referrer(&self, id: &str) -> Result<Option<String>>;

    /// Players directly referred by `id`.
    fn get_direct_referrals(&self, id: &str) -> Result<Vec<String>>;

    /// Breadth-first traversal of the referral graph rooted at `root`,
    /// up to `depth` levels, batching lookups one pass per level rather
    /// than one lookup per node.
    fn get_referral_tree(&self, root: &str, depth: usize, include_stats: bool) -> Result<ReferralTree>;
}

/// Shared helper: detect whether linking `referrer -> referred` would
/// create a cycle, by walking the referrer chain upward from
/// `referrer` and checking whether it ever reaches `referred`.
pub(crate) fn would_cycle<F>(referrer: &str, referred: &str, mut referrer_of: F) -> bool
where
    F: FnMut(&str) -> Option<String>,
{
    let mut current = referrer.to_string();
    let mut steps = 0usize;
    // Bounded by construction: the graph only grows by one edge per
    // call and we reject cycles on creation, so a finite walk always
    // terminates; the step cap is a defense against a corrupted graph.
    while steps < 1_000_000 {
        if current == referred {
            return true;
        }
        match referrer_of(&current) {
            Some(next) => current = next,
            None => return false,
        }
        steps += 1;
    }
    true
}

pub(crate) fn not_found(id: &str) -> Error {
    Error::NotFound(id.to_string())
}
