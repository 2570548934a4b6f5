//! Pity-counter bookkeeping for gacha-style pulls.
//!
//! Tracks, per player, how many consecutive pulls have gone by without
//! a rare result. When the counter reaches `threshold`, the next pull
//! is guaranteed rare and the counter resets. `was_pity` on a pull
//! result means exactly that: this pull's rare outcome is the one that
//! consumed the pity counter, not merely that the player happened to
//! pull something rare while below threshold.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Tracks consecutive non-rare pulls per player and decides when the
/// pity threshold forces a guaranteed rare result.
pub struct PityTracker {
    threshold: u32,
    counters: Mutex<HashMap<String, u32>>,
}

impl PityTracker {
    /// A tracker that guarantees a rare pull after `threshold`
    /// consecutive non-rare pulls.
    pub fn new(threshold: u32) -> Self {
        PityTracker {
            threshold,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// True if `player_id`'s next pull is pity-guaranteed rare.
    pub fn is_pity_due(&self, player_id: &str) -> bool {
        self.counters
            .lock()
            .get(player_id)
            .copied()
            .unwrap_or(0)
            >= self.threshold
    }

    /// Record the outcome of a pull for `player_id`.
    ///
    /// `rolled_rare` is whatever the gacha roll itself produced, before
    /// pity is taken into account. The counter resets on any rare
    /// result, natural or forced. Returns `was_pity`: true only when
    /// the pull was already at or above threshold, i.e. this result
    /// was guaranteed rare by the pity mechanic rather than by luck —
    /// a natural rare pull below threshold still resets the counter
    /// but reports `was_pity = false`.
    pub fn record_pull(&self, player_id: &str, rolled_rare: bool) -> bool {
        let mut counters = self.counters.lock();
        let counter = counters.entry(player_id.to_string()).or_insert(0);

        let pity_due = *counter >= self.threshold;

        if pity_due || rolled_rare {
            *counter = 0;
        } else {
            *counter += 1;
        }

        pity_due
    }

    /// Current consecutive-non-rare count for `player_id`.
    pub fn counter_for(&self, player_id: &str) -> u32 {
        self.counters.lock().get(player_id).copied().unwrap_or(0)
    }
}
