//! The task scheduler (Sch): cooperative one-shot and recurring tasks.
//!
//! Each scheduled task owns a dedicated OS thread that sleeps on a
//! condvar until its next fire time or an earlier cancellation. This
//! keeps the scheduler on the same blocking-thread concurrency model as
//! the rest of the engine rather than pulling in an async runtime.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// What a scheduled task's callback is allowed to do: run once,
/// report success or failure, nothing else. Errors are logged; the
/// scheduler does not retry a failed task on its own.
pub type TaskCallback = Box<dyn Fn() -> Result<(), String> + Send + 'static>;

/// Tunables for a [`Scheduler`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Upper bound on a single task's delay or recurrence interval;
    /// callers requesting a longer period get it clamped here.
    pub max_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    /// A short cap so recurring-task tests don't wait real hours.
    pub fn for_testing() -> Self {
        SchedulerConfig {
            max_interval: Duration::from_secs(1),
        }
    }
}

enum Recurrence {
    Once,
    Every(Duration),
}

struct TaskHandle {
    name: Option<String>,
    cancelled: AtomicBool,
    wake: Condvar,
    wake_lock: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// A running scheduler. Dropping it does not cancel outstanding tasks;
/// call [`Scheduler::shutdown`] explicitly to stop everything.
pub struct Scheduler {
    tasks: DashMap<String, Arc<TaskHandle>>,
    config: SchedulerConfig,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler {
            tasks: DashMap::new(),
            config: SchedulerConfig::default(),
        }
    }
}

impl Scheduler {
    /// An empty scheduler with default config.
    pub fn new() -> Self {
        Scheduler::default()
    }

    /// An empty scheduler with explicit config.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Scheduler {
            tasks: DashMap::new(),
            config,
        }
    }

    /// Schedule `callback` to run once, after `delay`. Returns the
    /// task id, usable with [`Scheduler::cancel`]. `delay` is clamped
    /// to this scheduler's configured `max_interval`. `name`, if given,
    /// is purely a diagnostic label surfaced through
    /// [`Scheduler::name_of`]; it plays no role in scheduling or
    /// cancellation.
    pub fn schedule_once(&self, delay: Duration, name: Option<&str>, callback: TaskCallback) -> String {
        let delay = delay.min(self.config.max_interval);
        self.spawn(uuid::Uuid::new_v4().to_string(), name, delay, Recurrence::Once, callback)
    }

    /// Schedule `callback` to run every `interval`. The first firing
    /// happens after `initial_delay` (default: `interval`, when
    /// `None`); every firing after that is spaced by `interval`. Both
    /// are clamped to this scheduler's configured `max_interval`.
    pub fn schedule_recurring(
        &self,
        interval: Duration,
        initial_delay: Option<Duration>,
        name: Option<&str>,
        callback: TaskCallback,
    ) -> String {
        let interval = interval.min(self.config.max_interval);
        let first_delay = initial_delay.unwrap_or(interval).min(self.config.max_interval);
        self.spawn(
            uuid::Uuid::new_v4().to_string(),
            name,
            first_delay,
            Recurrence::Every(interval),
            callback,
        )
    }

    fn spawn(
        &self,
        id: String,
        name: Option<&str>,
        first_delay: Duration,
        recurrence: Recurrence,
        callback: TaskCallback,
    ) -> String {
        let handle = Arc::new(TaskHandle {
            name: name.map(str::to_string),
            cancelled: AtomicBool::new(false),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            thread: Mutex::new(None),
        });

        let task_id = id.clone();
        let thread_handle = handle.clone();
        let join = std::thread::spawn(move || {
            let mut next_delay = first_delay;
            loop {
                let mut guard = thread_handle.wake_lock.lock();
                let result = thread_handle.wake.wait_for(&mut guard, next_delay);
                drop(guard);

                if thread_handle.cancelled.load(Ordering::SeqCst) {
                    return;
                }
                if !result.timed_out() {
                    // Notified without a pending cancellation: nothing
                    // else currently signals this condvar, but guard
                    // against a spurious wakeup by looping instead of
                    // firing early.
                    continue;
                }

                if let Err(err) = callback() {
                    tracing::error!(task_id = %task_id, error = %err, "scheduled task failed");
                }

                match recurrence {
                    Recurrence::Once => return,
                    Recurrence::Every(interval) => next_delay = interval,
                }
            }
        });

        *handle.thread.lock() = Some(join);
        self.tasks.insert(id.clone(), handle);
        id
    }

    /// Cancel a scheduled task. Returns `true` if it was found and is
    /// now stopping (its thread may still be mid-callback; this does
    /// not interrupt a callback already running).
    pub fn cancel(&self, task_id: &str) -> bool {
        if let Some((_, handle)) = self.tasks.remove(task_id) {
            handle.cancelled.store(true, Ordering::SeqCst);
            let _guard = handle.wake_lock.lock();
            handle.wake.notify_all();
            true
        } else {
            false
        }
    }

    /// Ids of tasks not yet cancelled or completed.
    pub fn list_active(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|e| !e.value().cancelled.load(Ordering::SeqCst))
            .map(|e| e.key().clone())
            .collect()
    }

    /// The diagnostic name a task was scheduled with, if any. `None`
    /// both for an unnamed task and for an unknown `task_id`.
    pub fn name_of(&self, task_id: &str) -> Option<String> {
        self.tasks.get(task_id).and_then(|e| e.name.clone())
    }

    /// Cancel every task and join their threads.
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cancel(&id);
        }
        for entry in self.tasks.iter() {
            if let Some(join) = entry.value().thread.lock().take() {
                let _ = join.join();
            }
        }
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn once_task_fires_exactly_once() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule_once(
            Duration::from_millis(10),
            None,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        scheduler.shutdown();
    }

    #[test]
    fn recurring_task_fires_multiple_times() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule_recurring(
            Duration::from_millis(10),
            None,
            None,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        std::thread::sleep(Duration::from_millis(60));
        scheduler.shutdown();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn recurring_task_honors_a_distinct_initial_delay() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule_recurring(
            Duration::from_millis(200),
            Some(Duration::from_millis(10)),
            None,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        std::thread::sleep(Duration::from_millis(60));
        scheduler.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1, "first fire should honor the short initial delay, not the long interval");
    }

    #[test]
    fn cancel_before_fire_prevents_execution() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = scheduler.schedule_once(
            Duration::from_millis(100),
            None,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        assert!(scheduler.cancel(&id));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn max_interval_clamps_a_longer_requested_delay() {
        let scheduler = Scheduler::with_config(SchedulerConfig::for_testing());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        scheduler.schedule_once(
            Duration::from_secs(3600),
            None,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        std::thread::sleep(Duration::from_millis(1200));
        scheduler.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn list_active_reflects_cancellation() {
        let scheduler = Scheduler::new();
        let id = scheduler.schedule_once(Duration::from_secs(5), None, Box::new(|| Ok(())));
        assert_eq!(scheduler.list_active(), vec![id.clone()]);
        scheduler.cancel(&id);
        assert!(scheduler.list_active().is_empty());
    }

    #[test]
    fn name_of_reports_the_label_a_task_was_scheduled_with() {
        let scheduler = Scheduler::new();
        let named = scheduler.schedule_once(Duration::from_secs(5), Some("nightly_reset"), Box::new(|| Ok(())));
        let unnamed = scheduler.schedule_once(Duration::from_secs(5), None, Box::new(|| Ok(())));
        assert_eq!(scheduler.name_of(&named), Some("nightly_reset".to_string()));
        assert_eq!(scheduler.name_of(&unnamed), None);
        assert_eq!(scheduler.name_of("not-a-real-id"), None);
    }
}
