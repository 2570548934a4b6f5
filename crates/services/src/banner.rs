//! `BannerManager`: time-windowed gacha banner lifecycle, driven by
//! [`forge_scheduler::Scheduler`] for its activate/expire transitions.
//!
//! Exactly one banner may be active at a time; activating a new one
//! deactivates whatever was active before it, rather than running two
//! banners side by side.

use chrono::{DateTime, Utc};
use forge_core::{Entity, Error, Result, Value};
use forge_events::{Event, EventBus, PityTracker};
use forge_scheduler::Scheduler;
use forge_storage::EntityStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Default pity threshold applied to banners created without an
/// explicit one.
pub const DEFAULT_PITY_THRESHOLD: u32 = 90;

/// Lifecycle state of a banner, mirrored into the backing entity's
/// `status` field as its own free-string vocabulary rather than the
/// trading-domain `forge_core::Status` — a banner's `scheduled`/
/// `active`/`expired`/`cancelled` states have no corresponding members
/// there and would otherwise collide with `Status`'s differently-meaning
/// `reserved`/`consumed`/`in_trade` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerPhase {
    /// Registered but not yet open to pulls.
    Scheduled,
    /// Open: pulls draw from this banner.
    Active,
    /// The banner's window has closed.
    Expired,
    /// Manually called off before its window closed.
    Cancelled,
}

impl BannerPhase {
    /// The string stored in the entity's `status` field.
    fn as_str(self) -> &'static str {
        match self {
            BannerPhase::Scheduled => "scheduled",
            BannerPhase::Active => "active",
            BannerPhase::Expired => "expired",
            BannerPhase::Cancelled => "cancelled",
        }
    }

    fn set_on(self, entity: &mut Entity) {
        entity.set_field("status", Value::String(self.as_str().to_string()));
    }

    fn matches(self, entity: &Entity) -> bool {
        entity.field("status").and_then(Value::as_str) == Some(self.as_str())
    }
}

/// Declares a banner before it's registered with a [`BannerManager`].
#[derive(Debug, Clone)]
pub struct BannerSpec {
    id: String,
    name: String,
    description: String,
    card_pool: Vec<String>,
    rarity_weights: Option<BTreeMap<String, f64>>,
    featured: Vec<String>,
}

impl BannerSpec {
    /// A banner over `card_pool`, which must be non-empty once passed
    /// to [`BannerManager::create`].
    pub fn new(id: impl Into<String>, name: impl Into<String>, card_pool: Vec<String>) -> Self {
        BannerSpec {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            card_pool,
            rarity_weights: None,
            featured: Vec::new(),
        }
    }

    /// Attach marketing copy.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Override the default rarity weighting for this banner's pulls.
    pub fn with_rarity_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.rarity_weights = Some(weights);
        self
    }

    /// Card ids promoted as this banner's featured pulls.
    pub fn with_featured(mut self, featured: Vec<String>) -> Self {
        self.featured = featured;
        self
    }
}

fn encode_string_list(items: &[String]) -> Value {
    Value::List(items.iter().cloned().map(Value::String).collect())
}

fn decode_string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_list)
        .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn banner_activated_payload(entity: &Entity) -> Value {
    let mut payload = BTreeMap::new();
    payload.insert("banner_id".to_string(), Value::String(entity.id.clone()));
    payload.insert(
        "name".to_string(),
        entity.field("name").cloned().unwrap_or(Value::Null),
    );
    if let (Some(starts), Some(ends)) = (
        entity.field("starts_at").and_then(Value::as_str).and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
        entity.field("ends_at").and_then(Value::as_str).and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
    ) {
        payload.insert(
            "duration_seconds".to_string(),
            Value::Int((ends - starts).num_seconds()),
        );
    }
    Value::Map(payload)
}

fn banner_expired_payload(entity: &Entity) -> Value {
    let mut payload = BTreeMap::new();
    payload.insert("banner_id".to_string(), Value::String(entity.id.clone()));
    payload.insert(
        "total_pulls".to_string(),
        entity.field("total_pulls").cloned().unwrap_or(Value::Int(0)),
    );
    Value::Map(payload)
}

/// Time-windowed gacha banner.
pub struct BannerManager {
    store: Arc<EntityStore>,
    events: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    pity: PityTracker,
    default_banner: Mutex<Option<String>>,
}

impl BannerManager {
    /// A manager operating over `store`, publishing on `events`, and
    /// scheduling activation/expiry through `scheduler`.
    pub fn new(store: Arc<EntityStore>, events: Arc<EventBus>, scheduler: Arc<Scheduler>) -> Self {
        BannerManager {
            store,
            events,
            scheduler,
            pity: PityTracker::new(DEFAULT_PITY_THRESHOLD),
            default_banner: Mutex::new(None),
        }
    }

    /// Configure the banner that `expire` falls back to activating
    /// when the banner it's expiring was the active one.
    pub fn set_default_banner(&self, id: impl Into<String>) {
        *self.default_banner.lock() = Some(id.into());
    }

    /// Register `spec` in status `scheduled`, to activate at
    /// `starts_at` and expire at `ends_at`.
    ///
    /// Fails if `spec.id` is already registered or `spec.card_pool` is
    /// empty.
    pub fn create(&self, spec: BannerSpec, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<Entity> {
        if self.store.exists(&spec.id)? {
            return Err(Error::Internal(format!("banner {} already exists", spec.id)));
        }
        if spec.card_pool.is_empty() {
            return Err(Error::Internal(format!("banner {} has an empty card pool", spec.id)));
        }

        let mut entity = Entity::new(&spec.id, "banner");
        BannerPhase::Scheduled.set_on(&mut entity);
        entity.set_field("name", spec.name.clone());
        entity.set_field("description", spec.description.clone());
        entity.set_field("card_pool", encode_string_list(&spec.card_pool));
        entity.set_field("featured", encode_string_list(&spec.featured));
        if let Some(weights) = &spec.rarity_weights {
            let encoded: BTreeMap<String, Value> = weights
                .iter()
                .map(|(k, v)| (k.clone(), Value::Float(*v)))
                .collect();
            entity.set_field("rarity_weights", Value::Map(encoded));
        }
        entity.set_field("starts_at", starts_at.to_rfc3339());
        entity.set_field("ends_at", ends_at.to_rfc3339());
        entity.set_field("total_pulls", 0i64);
        entity.set_field("unique_pullers", encode_string_list(&[]));
        let saved = self.store.set(&spec.id, entity)?;

        self.schedule_transition(&spec.id, starts_at, BannerPhase::Active, "banner_activated");
        self.schedule_transition(&spec.id, ends_at, BannerPhase::Expired, "banner_expired");

        Ok(saved)
    }

    /// Register `spec`, then schedule (via the scheduler) an activate
    /// at `now + initial_delay` (default: immediately) and an expire
    /// `duration` after that.
    pub fn create_flash(
        &self,
        spec: BannerSpec,
        duration: chrono::Duration,
        initial_delay: Option<chrono::Duration>,
    ) -> Result<Entity> {
        let starts_at = Utc::now() + initial_delay.unwrap_or_else(chrono::Duration::zero);
        self.create(spec, starts_at, starts_at + duration)
    }

    fn schedule_transition(&self, id: &str, at: DateTime<Utc>, phase: BannerPhase, topic: &'static str) {
        let delay = (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
        let store = self.store.clone();
        let events = self.events.clone();
        let id = id.to_string();

        self.scheduler.schedule_once(
            delay,
            Some(topic),
            Box::new(move || {
                let entity = if phase == BannerPhase::Active {
                    Self::activate_exclusively(&store, &id).map_err(|e| e.to_string())?;
                    store.get(&id).map_err(|e| e.to_string())?
                } else {
                    let mut entity = store
                        .get(&id)
                        .map_err(|e| e.to_string())?
                        .ok_or_else(|| format!("banner {id} disappeared before its scheduled transition"))?;
                    phase.set_on(&mut entity);
                    entity.set_field("expired_at", Utc::now().to_rfc3339());
                    Some(store.set(&id, entity).map_err(|e| e.to_string())?)
                };

                if let Some(entity) = entity {
                    let payload = if phase == BannerPhase::Active {
                        banner_activated_payload(&entity)
                    } else {
                        banner_expired_payload(&entity)
                    };
                    events.publish(Event::new(topic, payload));
                }
                Ok(())
            }),
        );
    }

    /// Activate `id` directly: deactivates whatever banner is currently
    /// active (back to `scheduled`), then marks `id` active with
    /// `activated_at = now`. Fails if `id` is expired or cancelled.
    pub fn activate(&self, id: &str) -> Result<Entity> {
        let entity = self.store.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        if BannerPhase::Expired.matches(&entity) || BannerPhase::Cancelled.matches(&entity) {
            return Err(Error::Internal(format!("banner {id} is expired or cancelled and cannot be reactivated")));
        }
        Self::activate_exclusively(&self.store, id)?;
        self.store.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Activate `id`, first returning whatever banner is currently
    /// active to `scheduled` (the single-active-banner invariant).
    fn activate_exclusively(store: &Arc<EntityStore>, id: &str) -> Result<()> {
        for other_id in store.by_type("banner") {
            if other_id == id {
                continue;
            }
            if let Some(mut other) = store.get(&other_id)? {
                if BannerPhase::Active.matches(&other) {
                    BannerPhase::Scheduled.set_on(&mut other);
                    store.set(&other_id, other)?;
                }
            }
        }

        let mut entity = store
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        BannerPhase::Active.set_on(&mut entity);
        entity.set_field("activated_at", Utc::now().to_rfc3339());
        store.set(id, entity)?;
        Ok(())
    }

    /// Mark `id` expired. If it was the active banner and a default
    /// banner is configured, the default is activated next.
    pub fn expire(&self, id: &str) -> Result<Entity> {
        let mut entity = self.store.get(id)?.ok_or_else(|| Error::NotFound(id.to_string()))?;
        let was_active = BannerPhase::Active.matches(&entity);
        BannerPhase::Expired.set_on(&mut entity);
        entity.set_field("expired_at", Utc::now().to_rfc3339());
        let saved = self.store.set(id, entity)?;
        self.events.publish(Event::new("banner_expired", banner_expired_payload(&saved)));

        if was_active {
            if let Some(default_id) = self.default_banner.lock().clone() {
                if default_id != id {
                    self.activate(&default_id)?;
                }
            }
        }

        Ok(saved)
    }

    /// The currently active banner id, if any.
    pub fn active_banner(&self) -> Result<Option<String>> {
        for id in self.store.by_type("banner") {
            if let Some(entity) = self.store.get(&id)? {
                if BannerPhase::Active.matches(&entity) {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Record `count` pulls by `player_id` against `banner_id`'s pull
    /// statistics (`total_pulls`, `unique_pullers`). This is banner
    /// bookkeeping only; see [`BannerManager::record_pity_pull`] for
    /// the separate per-player pity mechanic.
    pub fn track_pull(&self, banner_id: &str, player_id: &str, count: u32) -> Result<()> {
        loop {
            let mut entity = self
                .store
                .get(banner_id)?
                .ok_or_else(|| Error::NotFound(banner_id.to_string()))?;

            let total_pulls = entity.field("total_pulls").and_then(Value::as_int).unwrap_or(0);
            entity.set_field("total_pulls", total_pulls + count as i64);

            let mut pullers = decode_string_list(entity.field("unique_pullers"));
            if !pullers.iter().any(|p| p == player_id) {
                pullers.push(player_id.to_string());
            }
            entity.set_field("unique_pullers", encode_string_list(&pullers));

            match self.store.set(banner_id, entity) {
                Ok(_) => return Ok(()),
                Err(Error::VersionConflict { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    /// Record a gacha pull outcome for `player_id` against the shared
    /// pity counter, returning whether this pull's rare result was
    /// pity-driven. Distinct from [`BannerManager::track_pull`], which
    /// is banner-scoped pull-volume bookkeeping rather than the
    /// per-player pity mechanic.
    pub fn record_pity_pull(&self, player_id: &str, rolled_rare: bool) -> bool {
        self.pity.record_pull(player_id, rolled_rare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> BannerManager {
        BannerManager::new(
            Arc::new(EntityStore::new()),
            Arc::new(EventBus::new()),
            Arc::new(Scheduler::new()),
        )
    }

    fn spec(id: &str) -> BannerSpec {
        BannerSpec::new(id, "Starlight Rerun", vec!["card_a".to_string(), "card_b".to_string()])
    }

    #[test]
    fn create_starts_reserved() {
        let mgr = manager();
        let entity = mgr
            .create(spec("b1"), Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2))
            .unwrap();
        assert!(BannerPhase::Scheduled.matches(&entity));
        assert_eq!(entity.field("name").and_then(Value::as_str), Some("Starlight Rerun"));
    }

    #[test]
    fn create_rejects_empty_card_pool() {
        let mgr = manager();
        let empty = BannerSpec::new("b1", "Empty", Vec::new());
        assert!(mgr.create(empty, Utc::now(), Utc::now() + Duration::hours(1)).is_err());
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let mgr = manager();
        mgr.create(spec("b1"), Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2))
            .unwrap();
        assert!(mgr
            .create(spec("b1"), Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2))
            .is_err());
    }

    #[test]
    fn already_elapsed_window_activates_almost_immediately() {
        let mgr = manager();
        mgr.create(spec("b1"), Utc::now() - Duration::seconds(1), Utc::now() + Duration::hours(1))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(mgr.active_banner().unwrap(), Some("b1".to_string()));
    }

    #[test]
    fn activating_a_new_banner_deactivates_the_old_one() {
        let mgr = manager();
        mgr.create(spec("b1"), Utc::now() - Duration::seconds(1), Utc::now() + Duration::hours(1))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(mgr.active_banner().unwrap(), Some("b1".to_string()));

        mgr.create(spec("b2"), Utc::now() - Duration::seconds(1), Utc::now() + Duration::hours(1))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(mgr.active_banner().unwrap(), Some("b2".to_string()));
    }

    #[test]
    fn expire_falls_back_to_the_configured_default_banner() {
        let mgr = manager();
        mgr.create(spec("default"), Utc::now() + Duration::hours(5), Utc::now() + Duration::hours(6))
            .unwrap();
        mgr.set_default_banner("default");

        mgr.create(spec("b1"), Utc::now() - Duration::seconds(1), Utc::now() + Duration::hours(1))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(mgr.active_banner().unwrap(), Some("b1".to_string()));

        mgr.expire("b1").unwrap();
        assert_eq!(mgr.active_banner().unwrap(), Some("default".to_string()));
    }

    #[test]
    fn activate_rejects_an_expired_banner() {
        let mgr = manager();
        mgr.create(spec("b1"), Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2))
            .unwrap();
        mgr.expire("b1").unwrap();
        assert!(mgr.activate("b1").is_err());
    }

    #[test]
    fn track_pull_accumulates_totals_and_dedups_pullers() {
        let mgr = manager();
        mgr.create(spec("b1"), Utc::now() + Duration::hours(1), Utc::now() + Duration::hours(2))
            .unwrap();

        mgr.track_pull("b1", "p1", 10).unwrap();
        mgr.track_pull("b1", "p1", 5).unwrap();
        mgr.track_pull("b1", "p2", 1).unwrap();

        let entity = mgr.store.get("b1").unwrap().unwrap();
        assert_eq!(entity.field("total_pulls").and_then(Value::as_int), Some(16));
        assert_eq!(decode_string_list(entity.field("unique_pullers")).len(), 2);
    }

    #[test]
    fn record_pity_pull_is_independent_of_banner_pull_stats() {
        let mgr = manager();
        for _ in 0..DEFAULT_PITY_THRESHOLD {
            mgr.record_pity_pull("p1", false);
        }
        assert!(mgr.record_pity_pull("p1", false));
    }
}
