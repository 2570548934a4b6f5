//! # forge-services
//!
//! Representative services built on the engine core: [`RaidService`], a
//! worked example of optimistic-retry under contention, and
//! [`BannerManager`], a scheduler-driven time-windowed lifecycle.

pub mod banner;
pub mod raid;

pub use banner::{BannerManager, BannerPhase, BannerSpec, DEFAULT_PITY_THRESHOLD};
pub use raid::{AttackResult, RaidPhase, RaidService, MAX_ATTACK_RETRIES};
