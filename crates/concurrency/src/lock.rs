//! Per-entity locking (L).
//!
//! One `parking_lot::Mutex<()>` per locked id, held in a `DashMap` so
//! unrelated ids never contend with each other. Multi-id acquisition
//! always sorts ids first so two callers racing to lock the same pair
//! never deadlock by acquiring in opposite order.

use dashmap::DashMap;
use parking_lot::lock_api::{RawMutex as _, RawMutexTimed};
use parking_lot::RawMutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure acquiring one or more locks.
#[derive(Debug, Error)]
pub enum LockError {
    /// Could not acquire every requested lock within the timeout.
    #[error("timed out acquiring lock on {0}")]
    Timeout(String),
}

/// Result alias for lock acquisition.
pub type Result<T> = std::result::Result<T, LockError>;

struct Slot {
    raw: RawMutex,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            raw: RawMutex::INIT,
        }
    }
}

/// Tunables for a [`LockManager`].
#[derive(Debug, Clone, Copy)]
pub struct LockManagerConfig {
    /// Default timeout used by [`LockManager::acquire_default`].
    pub default_timeout: Duration,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        LockManagerConfig {
            default_timeout: Duration::from_secs(5),
        }
    }
}

impl LockManagerConfig {
    /// A short default timeout so contention tests fail fast instead of
    /// stalling.
    pub fn for_testing() -> Self {
        LockManagerConfig {
            default_timeout: Duration::from_millis(200),
        }
    }
}

/// Registry of per-id locks.
///
/// Locks are created lazily on first acquisition and never removed
/// automatically; call [`LockManager::gc`] during idle periods to drop
/// slots nobody currently holds.
pub struct LockManager {
    slots: DashMap<String, Arc<Slot>>,
    config: LockManagerConfig,
}

impl Default for LockManager {
    fn default() -> Self {
        LockManager {
            slots: DashMap::new(),
            config: LockManagerConfig::default(),
        }
    }
}

/// RAII guard for a set of held locks, released in reverse acquisition
/// order when the guard drops.
pub struct LockGuard {
    // Held in acquisition order; Drop below unlocks in reverse.
    held: Vec<Arc<Slot>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        for slot in self.held.iter().rev() {
            // SAFETY: every `Arc<Slot>` in `held` was locked by this
            // guard's own `acquire` call and is unlocked exactly once,
            // here, on drop.
            unsafe { slot.raw.unlock() };
        }
    }
}

impl LockManager {
    /// An empty registry with default config.
    pub fn new() -> Self {
        LockManager::default()
    }

    /// An empty registry with explicit config.
    pub fn with_config(config: LockManagerConfig) -> Self {
        LockManager {
            slots: DashMap::new(),
            config,
        }
    }

    /// Acquire locks on every id in `ids` using this manager's
    /// configured default timeout.
    pub fn acquire_default(&self, ids: &[String]) -> Result<LockGuard> {
        self.acquire(ids, self.config.default_timeout)
    }

    fn slot_for(&self, id: &str) -> Arc<Slot> {
        self.slots
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Slot::default()))
            .clone()
    }

    /// Acquire locks on every id in `ids`, blocking up to `timeout`.
    ///
    /// Ids are sorted before acquisition regardless of the order given,
    /// so two callers locking an overlapping id set never deadlock.
    /// Duplicate ids are locked once. On timeout, every lock already
    /// acquired for this call is released before returning the error.
    pub fn acquire(&self, ids: &[String], timeout: Duration) -> Result<LockGuard> {
        let mut sorted: Vec<String> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut held = Vec::with_capacity(sorted.len());

        for id in &sorted {
            let slot = self.slot_for(id);
            if slot.raw.try_lock_for(timeout) {
                held.push(slot);
            } else {
                tracing::warn!(id = %id, ?timeout, "timed out acquiring lock");
                // Release everything acquired so far before bailing;
                // dropping `held` here runs LockGuard-style unlocks.
                for acquired in held.iter().rev() {
                    unsafe { acquired.raw.unlock() };
                }
                return Err(LockError::Timeout(id.clone()));
            }
        }

        Ok(LockGuard { held })
    }

    /// Acquire a single id's lock.
    pub fn acquire_one(&self, id: &str, timeout: Duration) -> Result<LockGuard> {
        self.acquire(std::slice::from_ref(&id.to_string()), timeout)
    }

    /// Run `f` while holding locks on every id in `ids`, releasing them
    /// when `f` returns (whether it returns `Ok` or `Err`).
    pub fn scoped<T>(
        &self,
        ids: &[String],
        timeout: Duration,
        f: impl FnOnce() -> T,
    ) -> Result<T> {
        let _guard = self.acquire(ids, timeout)?;
        Ok(f())
    }

    /// True if `id` currently has an outstanding lock held (best-effort;
    /// racy by nature, intended for diagnostics).
    pub fn is_locked(&self, id: &str) -> bool {
        match self.slots.get(id) {
            Some(slot) => {
                if slot.raw.try_lock() {
                    // SAFETY: we just acquired it ourselves, above.
                    unsafe { slot.raw.unlock() };
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    /// Drop lock slots for ids with no outstanding `Arc` reference
    /// beyond the registry's own. Safe to call at any time; never
    /// drops a slot that's currently held or referenced by an in-flight
    /// acquisition.
    pub fn gc(&self) {
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    /// Number of distinct ids this manager has ever created a slot for.
    pub fn tracked_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn acquire_and_release_frees_the_lock() {
        let mgr = LockManager::new();
        {
            let _g = mgr.acquire(&["a".to_string()], Duration::from_millis(50)).unwrap();
            assert!(mgr.is_locked("a"));
        }
        assert!(!mgr.is_locked("a"));
    }

    #[test]
    fn sorted_multi_acquire_never_deadlocks() {
        let mgr = Arc::new(LockManager::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let m1 = mgr.clone();
        let c1 = counter.clone();
        let t1 = thread::spawn(move || {
            for _ in 0..50 {
                let _g = m1
                    .acquire(&["a".to_string(), "b".to_string()], Duration::from_secs(1))
                    .unwrap();
                c1.fetch_add(1, Ordering::SeqCst);
            }
        });

        let m2 = mgr.clone();
        let c2 = counter.clone();
        let t2 = thread::spawn(move || {
            for _ in 0..50 {
                // Reversed id order; must not deadlock against t1.
                let _g = m2
                    .acquire(&["b".to_string(), "a".to_string()], Duration::from_secs(1))
                    .unwrap();
                c2.fetch_add(1, Ordering::SeqCst);
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn timeout_releases_partial_acquisitions() {
        let mgr = LockManager::new();
        let _held = mgr.acquire(&["b".to_string()], Duration::from_millis(50)).unwrap();

        let err = mgr
            .acquire(&["a".to_string(), "b".to_string()], Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout(id) if id == "b"));

        // `a` must have been released even though the overall call failed.
        assert!(!mgr.is_locked("a"));
    }

    #[test]
    fn duplicate_ids_in_request_lock_once() {
        let mgr = LockManager::new();
        let _g = mgr
            .acquire(&["a".to_string(), "a".to_string()], Duration::from_millis(50))
            .unwrap();
        assert!(mgr.is_locked("a"));
    }

    #[test]
    fn acquire_default_uses_configured_timeout() {
        let mgr = LockManager::with_config(LockManagerConfig::for_testing());
        let _held = mgr.acquire(&["a".to_string()], Duration::from_millis(50)).unwrap();
        let err = mgr.acquire_default(&["a".to_string()]).unwrap_err();
        assert!(matches!(err, LockError::Timeout(id) if id == "a"));
    }

    #[test]
    fn gc_drops_unheld_slots() {
        let mgr = LockManager::new();
        {
            let _g = mgr.acquire(&["a".to_string()], Duration::from_millis(50)).unwrap();
        }
        assert_eq!(mgr.tracked_count(), 1);
        mgr.gc();
        assert_eq!(mgr.tracked_count(), 0);
    }
}
