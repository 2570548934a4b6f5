//! `RaidService`: a shared boss-hp counter under heavy concurrent
//! write pressure, used as the engine's worked example of optimistic
//! retry instead of per-command locking.
//!
//! Attacks don't go through `forge-executor`'s lock-then-transaction
//! path at all — every attacker races to decrement the same `hp`
//! field, and conflicts are resolved by re-reading and retrying rather
//! than serializing through a lock. This is deliberate: a raid boss is
//! exactly the high-contention, short-critical-section shape optimistic
//! concurrency is good at, and the boss only has to reject or accept a
//! single integer subtraction, not juggle multiple entities.
//!
//! The raid record's own optimistic token is `Entity::version` itself
//! (`EntityStore::set`'s built-in version check); this service does not
//! carry a second, raid-local version counter alongside it — one check
//! is sufficient and a duplicate would only be extra bookkeeping to
//! keep in sync.

use chrono::{DateTime, Utc};
use forge_core::{Entity, Error, Result, Value};
use forge_events::{Event, EventBus};
use forge_storage::EntityStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default bounded number of optimistic retries before an attack gives up.
pub const MAX_ATTACK_RETRIES: u32 = 5;

/// Backoff slept between a version-conflict retry and the next attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Lifecycle state of a raid, mirrored into the backing entity's
/// `status` field as its own free-string vocabulary — a raid's status
/// is never one of the trading-domain `forge_core::Status` values (that
/// enum is closed over item/card conventions and doesn't have a
/// matching member for any of these), so it's written and read as a
/// plain string instead of routed through `Entity::set_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaidPhase {
    /// Created but not yet open to attacks.
    Scheduled,
    /// Open: attacks are accepted.
    Active,
    /// Boss hp reached zero.
    Completed,
    /// The raid's window closed before the boss was defeated.
    Expired,
    /// Manually called off.
    Cancelled,
}

impl RaidPhase {
    /// The string stored in the entity's `status` field.
    fn as_str(self) -> &'static str {
        match self {
            RaidPhase::Scheduled => "scheduled",
            RaidPhase::Active => "active",
            RaidPhase::Completed => "completed",
            RaidPhase::Expired => "expired",
            RaidPhase::Cancelled => "cancelled",
        }
    }

    fn set_on(self, entity: &mut Entity) {
        entity.set_field("status", Value::String(self.as_str().to_string()));
    }

    fn matches(self, entity: &Entity) -> bool {
        entity.field("status").and_then(Value::as_str) == Some(self.as_str())
    }
}

/// Per-player attack history on a single raid.
#[derive(Debug, Clone, Copy)]
struct ParticipantStats {
    total_damage: i64,
    attack_count: u32,
    first_attack: DateTime<Utc>,
    last_attack: DateTime<Utc>,
}

fn read_participants(entity: &Entity) -> BTreeMap<String, ParticipantStats> {
    entity
        .field("participants")
        .and_then(Value::as_map)
        .map(|m| {
            m.iter()
                .filter_map(|(id, v)| {
                    let inner = v.as_map()?;
                    let first_attack = inner
                        .get("first_attack")
                        .and_then(Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))?;
                    let last_attack = inner
                        .get("last_attack")
                        .and_then(Value::as_str)
                        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&Utc))?;
                    Some((
                        id.clone(),
                        ParticipantStats {
                            total_damage: inner.get("total_damage").and_then(Value::as_int).unwrap_or(0),
                            attack_count: inner
                                .get("attack_count")
                                .and_then(Value::as_int)
                                .unwrap_or(0) as u32,
                            first_attack,
                            last_attack,
                        },
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn write_participants(entity: &mut Entity, participants: &BTreeMap<String, ParticipantStats>) {
    let encoded: BTreeMap<String, Value> = participants
        .iter()
        .map(|(id, stats)| {
            let mut inner = BTreeMap::new();
            inner.insert("total_damage".to_string(), Value::Int(stats.total_damage));
            inner.insert("attack_count".to_string(), Value::Int(stats.attack_count as i64));
            inner.insert("first_attack".to_string(), Value::String(stats.first_attack.to_rfc3339()));
            inner.insert("last_attack".to_string(), Value::String(stats.last_attack.to_rfc3339()));
            (id.clone(), Value::Map(inner))
        })
        .collect();
    entity.set_field("participants", Value::Map(encoded));
}

/// Result of a single `attack` call.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackResult {
    /// False only when every retry under contention was exhausted;
    /// everything else is zeroed in that case.
    pub success: bool,
    /// Damage actually applied this call (clamped to remaining hp).
    pub damage_dealt: i64,
    /// Boss hp remaining after this attack (0 if defeated).
    pub current_hp: i64,
    /// The raid's starting hp.
    pub max_hp: i64,
    /// This player's share of total damage dealt so far, 0-100.
    pub percentage: f64,
    /// True if this attack brought the boss to 0 hp.
    pub defeated: bool,
    /// This player's 1-based rank on the damage leaderboard.
    pub rank: usize,
    /// This player's cumulative damage dealt to this raid.
    pub total_contribution: i64,
    /// Number of version-conflict retries this call needed.
    pub retry_count: u32,
}

/// High-contention boss encounter backed by the entity store.
pub struct RaidService {
    store: Arc<EntityStore>,
    events: Arc<EventBus>,
    max_retries: u32,
}

impl RaidService {
    /// A service operating over `store`, publishing lifecycle events
    /// on `events`, retrying an attack up to [`MAX_ATTACK_RETRIES`]
    /// times on contention.
    pub fn new(store: Arc<EntityStore>, events: Arc<EventBus>) -> Self {
        RaidService {
            store,
            events,
            max_retries: MAX_ATTACK_RETRIES,
        }
    }

    /// A service with an explicit retry bound, for callers that want a
    /// tighter or looser contention budget than the default.
    pub fn with_max_retries(store: Arc<EntityStore>, events: Arc<EventBus>, max_retries: u32) -> Self {
        RaidService {
            store,
            events,
            max_retries,
        }
    }

    /// Create a new raid at `max_hp`, initially scheduled (not yet
    /// open to attacks).
    pub fn create_raid(&self, id: &str, max_hp: i64, ends_at: DateTime<Utc>) -> Result<Entity> {
        let mut entity = Entity::new(id, "raid");
        RaidPhase::Scheduled.set_on(&mut entity);
        entity.set_field("max_hp", max_hp);
        entity.set_field("hp", max_hp);
        entity.set_field("expires_at", ends_at.to_rfc3339());
        write_participants(&mut entity, &BTreeMap::new());
        self.store.set(id, entity)
    }

    /// Open `id` to attacks, stamping `activated_at`.
    pub fn activate(&self, id: &str) -> Result<Entity> {
        loop {
            let mut entity = self
                .store
                .get(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            RaidPhase::Active.set_on(&mut entity);
            entity.set_field("activated_at", Utc::now().to_rfc3339());
            match self.store.set(id, entity) {
                Ok(saved) => return Ok(saved),
                Err(Error::VersionConflict { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    /// Close `id`'s window without it being defeated.
    pub fn expire(&self, id: &str) -> Result<Entity> {
        self.transition(id, RaidPhase::Expired)
    }

    /// Call off `id`.
    pub fn cancel(&self, id: &str) -> Result<Entity> {
        self.transition(id, RaidPhase::Cancelled)
    }

    fn transition(&self, id: &str, phase: RaidPhase) -> Result<Entity> {
        loop {
            let mut entity = self
                .store
                .get(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            phase.set_on(&mut entity);
            match self.store.set(id, entity) {
                Ok(saved) => return Ok(saved),
                Err(Error::VersionConflict { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
    }

    fn expires_at(entity: &Entity) -> Option<DateTime<Utc>> {
        entity
            .field("expires_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Deal `damage` to `raid_id` on behalf of `player_id`.
    ///
    /// Retries the read-modify-write up to this service's configured
    /// retry bound on a version conflict; if every retry is consumed
    /// under contention, returns `Ok` with `AttackResult::success =
    /// false` rather than an error, since the attack itself was a
    /// legal request that simply lost every race. A raid that doesn't
    /// exist, isn't active, or has passed its expiry window is a
    /// precondition failure and returns `Err` instead (the expiry case
    /// also transitions the raid to `expired` as a side effect).
    pub fn attack(&self, raid_id: &str, player_id: &str, damage: i64) -> Result<AttackResult> {
        for attempt in 0..self.max_retries {
            let mut entity = self
                .store
                .get(raid_id)?
                .ok_or_else(|| Error::NotFound(raid_id.to_string()))?;

            if !RaidPhase::Active.matches(&entity) {
                return Err(Error::Internal(format!("raid {raid_id} is not active")));
            }

            if let Some(expires_at) = Self::expires_at(&entity) {
                if Utc::now() > expires_at {
                    let _ = self.expire(raid_id);
                    return Err(Error::Internal(format!("raid {raid_id} has expired")));
                }
            }

            let max_hp = entity.field("max_hp").and_then(Value::as_int).unwrap_or(0);
            let current_hp = entity.field("hp").and_then(Value::as_int).unwrap_or(0);
            let damage_dealt = damage.min(current_hp);
            let new_hp = current_hp - damage_dealt;
            entity.set_field("hp", new_hp);

            let now = Utc::now();
            let mut participants = read_participants(&entity);
            let stats = participants
                .entry(player_id.to_string())
                .or_insert(ParticipantStats {
                    total_damage: 0,
                    attack_count: 0,
                    first_attack: now,
                    last_attack: now,
                });
            stats.total_damage += damage_dealt;
            stats.attack_count += 1;
            stats.last_attack = now;
            let total_contribution = stats.total_damage;
            write_participants(&mut entity, &participants);

            let defeated = new_hp == 0;
            if defeated {
                RaidPhase::Completed.set_on(&mut entity);
            }

            match self.store.set(raid_id, entity) {
                Ok(_) => {
                    if defeated {
                        let mut payload = BTreeMap::new();
                        payload.insert("raid_id".to_string(), Value::String(raid_id.to_string()));
                        payload.insert("max_hp".to_string(), Value::Int(max_hp));
                        self.events.publish(Event::new("raid_completed", Value::Map(payload)));
                    }

                    let total_damage: i64 = participants.values().map(|s| s.total_damage).sum();
                    let percentage = if total_damage > 0 {
                        total_contribution as f64 / total_damage as f64 * 100.0
                    } else {
                        0.0
                    };
                    let rank = Self::rank_of(&participants, player_id);

                    return Ok(AttackResult {
                        success: true,
                        damage_dealt,
                        current_hp: new_hp,
                        max_hp,
                        percentage,
                        defeated,
                        rank,
                        total_contribution,
                        retry_count: attempt,
                    });
                }
                Err(Error::VersionConflict { .. }) => {
                    tracing::debug!(raid_id, attempt, "attack lost the optimistic race, retrying");
                    std::thread::sleep(RETRY_BACKOFF);
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Ok(AttackResult {
            success: false,
            damage_dealt: 0,
            current_hp: 0,
            max_hp: 0,
            percentage: 0.0,
            defeated: false,
            rank: 0,
            total_contribution: 0,
            retry_count: self.max_retries,
        })
    }

    fn rank_of(participants: &BTreeMap<String, ParticipantStats>, player_id: &str) -> usize {
        let mut ranked: Vec<(&String, i64)> = participants
            .iter()
            .map(|(id, s)| (id, s.total_damage))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .iter()
            .position(|(id, _)| id.as_str() == player_id)
            .map(|pos| pos + 1)
            .unwrap_or(0)
    }

    /// Players ranked by total damage dealt, highest first, each with
    /// their contribution percentage of the raid's total damage,
    /// truncated to `limit` entries.
    pub fn leaderboard(&self, raid_id: &str, limit: usize) -> Result<Vec<(String, i64, f64)>> {
        let entity = self
            .store
            .get(raid_id)?
            .ok_or_else(|| Error::NotFound(raid_id.to_string()))?;
        let participants = read_participants(&entity);
        let total_damage: i64 = participants.values().map(|s| s.total_damage).sum();

        let mut ranked: Vec<(String, i64)> = participants
            .into_iter()
            .map(|(id, s)| (id, s.total_damage))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(id, damage)| {
                let pct = if total_damage > 0 {
                    damage as f64 / total_damage as f64 * 100.0
                } else {
                    0.0
                };
                (id, damage, pct)
            })
            .collect())
    }

    /// Damage `player_id` has dealt to `raid_id` so far.
    pub fn player_contribution(&self, raid_id: &str, player_id: &str) -> Result<i64> {
        let entity = self
            .store
            .get(raid_id)?
            .ok_or_else(|| Error::NotFound(raid_id.to_string()))?;
        Ok(read_participants(&entity)
            .get(player_id)
            .map(|s| s.total_damage)
            .unwrap_or(0))
    }

    /// Every raid id currently resident in the working set.
    pub fn all_raids(&self) -> Vec<String> {
        self.store.by_type("raid")
    }

    /// Raid ids whose status is currently active.
    pub fn active_raids(&self) -> Result<Vec<String>> {
        let mut active = Vec::new();
        for id in self.all_raids() {
            if let Some(entity) = self.store.get(&id)? {
                if RaidPhase::Active.matches(&entity) {
                    active.push(id);
                }
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::thread;

    fn service() -> RaidService {
        RaidService::new(Arc::new(EntityStore::new()), Arc::new(EventBus::new()))
    }

    #[test]
    fn attack_below_zero_clamps_to_zero_and_completes() {
        let svc = service();
        svc.create_raid("r1", 10, Utc::now() + ChronoDuration::hours(1)).unwrap();
        svc.activate("r1").unwrap();

        let result = svc.attack("r1", "p1", 999).unwrap();
        assert!(result.success);
        assert_eq!(result.damage_dealt, 10);
        assert_eq!(result.current_hp, 0);
        assert!(result.defeated);
        assert_eq!(result.rank, 1);
        assert_eq!(result.total_contribution, 10);
        assert!((result.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn attack_on_inactive_raid_is_rejected() {
        let svc = service();
        svc.create_raid("r1", 10, Utc::now() + ChronoDuration::hours(1)).unwrap();
        assert!(svc.attack("r1", "p1", 1).is_err());
    }

    #[test]
    fn attack_past_the_expiry_window_expires_the_raid_and_fails() {
        let svc = service();
        svc.create_raid("r1", 1000, Utc::now() - ChronoDuration::seconds(1)).unwrap();
        svc.activate("r1").unwrap();

        assert!(svc.attack("r1", "p1", 10).is_err());
        let entity = svc.store.get("r1").unwrap().unwrap();
        assert!(RaidPhase::Expired.matches(&entity));
    }

    #[test]
    fn retries_exhausted_reports_failure_without_erroring() {
        let svc = RaidService::with_max_retries(Arc::new(EntityStore::new()), Arc::new(EventBus::new()), 0);
        svc.create_raid("r1", 1000, Utc::now() + ChronoDuration::hours(1)).unwrap();
        svc.activate("r1").unwrap();

        let result = svc.attack("r1", "p1", 10).unwrap();
        assert!(!result.success);
        assert_eq!(result.retry_count, 0);
    }

    #[test]
    fn leaderboard_ranks_by_total_damage_with_percentage() {
        let svc = service();
        svc.create_raid("r1", 1000, Utc::now() + ChronoDuration::hours(1)).unwrap();
        svc.activate("r1").unwrap();
        svc.attack("r1", "p1", 10).unwrap();
        svc.attack("r1", "p2", 50).unwrap();
        svc.attack("r1", "p1", 10).unwrap();

        let board = svc.leaderboard("r1", 10).unwrap();
        assert_eq!(board[0].0, "p2");
        assert_eq!(board[0].1, 50);
        assert_eq!(board[1].0, "p1");
        assert_eq!(board[1].1, 20);
        let total_pct: f64 = board.iter().map(|(_, _, pct)| pct).sum();
        assert!((total_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn leaderboard_respects_limit() {
        let svc = service();
        svc.create_raid("r1", 1000, Utc::now() + ChronoDuration::hours(1)).unwrap();
        svc.activate("r1").unwrap();
        svc.attack("r1", "p1", 10).unwrap();
        svc.attack("r1", "p2", 50).unwrap();
        svc.attack("r1", "p3", 5).unwrap();

        assert_eq!(svc.leaderboard("r1", 2).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_attacks_all_land_under_contention() {
        let svc = Arc::new(service());
        svc.create_raid("r1", 100_000, Utc::now() + ChronoDuration::hours(1)).unwrap();
        svc.activate("r1").unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let svc = svc.clone();
                thread::spawn(move || {
                    for _ in 0..20 {
                        let result = svc.attack("r1", &format!("p{i}"), 1).unwrap();
                        assert!(result.success);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total: i64 = svc
            .leaderboard("r1", usize::MAX)
            .unwrap()
            .iter()
            .map(|(_, dmg, _)| dmg)
            .sum();
        assert_eq!(total, 16 * 20);
    }
}
