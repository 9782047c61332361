//! Multi-timer coordinator, `std`-only.
//!
//! A background thread parked on a `Condvar` owns the timer list; the
//! "drop the lock before invoking callbacks, re-acquire per timer" rule
//! keeps a slow or panicking callback from blocking `arm`/`cancel` calls
//! from other threads.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Opaque handle to a registered timer.
pub type TimerId = u64;

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

struct TimerEntry {
    deadline: Instant,
    interval: Option<Duration>,
    enabled: bool,
    callback: Callback,
}

struct State {
    timers: BTreeMap<TimerId, TimerEntry>,
    next_id: TimerId,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// A single-threaded coordinator owning all timers for a connection or
/// server. Cheap to clone (an `Arc` handle internally) but only the owner
/// that called [`TimerManager::new`] should call [`TimerManager::stop`].
pub struct TimerManager {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl TimerManager {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                timers: BTreeMap::new(),
                next_id: 1,
                running: true,
            }),
            condvar: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || Self::run(worker_shared));

        Self {
            shared,
            worker: Some(worker),
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let mut guard = shared.state.lock().unwrap();
            if !guard.running {
                return;
            }

            let now = Instant::now();
            let next_deadline = guard
                .timers
                .values()
                .filter(|t| t.enabled)
                .map(|t| t.deadline)
                .min();

            match next_deadline {
                None => {
                    let _guard = shared.condvar.wait(guard).unwrap();
                    continue;
                }
                Some(deadline) if deadline > now => {
                    let (_guard, _timeout) = shared
                        .condvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap();
                    continue;
                }
                Some(_) => {
                    let expired: Vec<TimerId> = guard
                        .timers
                        .iter()
                        .filter(|(_, t)| t.enabled && t.deadline <= now)
                        .map(|(id, _)| *id)
                        .collect();
                    drop(guard);

                    for id in expired {
                        let callback = {
                            let mut guard = shared.state.lock().unwrap();
                            match guard.timers.get_mut(&id) {
                                Some(entry) if entry.enabled => {
                                    let cb = Arc::clone(&entry.callback);
                                    match entry.interval {
                                        Some(interval) => entry.deadline = Instant::now() + interval,
                                        None => {
                                            guard.timers.remove(&id);
                                        }
                                    }
                                    Some(cb)
                                }
                                _ => None,
                            }
                        };

                        if let Some(cb) = callback {
                            let _ = catch_unwind(AssertUnwindSafe(|| cb()));
                        }
                    }
                }
            }
        }
    }

    /// Registers a new timer, enabled immediately, firing after `duration`.
    /// If `periodic`, it rearms to `now + duration` after each firing;
    /// otherwise it is removed after firing once.
    pub fn add<F>(&self, duration: Duration, periodic: bool, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut guard = self.shared.state.lock().unwrap();
        let id = guard.next_id;
        guard.next_id += 1;
        guard.timers.insert(
            id,
            TimerEntry {
                deadline: Instant::now() + duration,
                interval: if periodic { Some(duration) } else { None },
                enabled: true,
                callback: Arc::new(callback),
            },
        );
        drop(guard);
        self.shared.condvar.notify_all();
        id
    }

    pub fn remove(&self, id: TimerId) {
        let mut guard = self.shared.state.lock().unwrap();
        guard.timers.remove(&id);
        drop(guard);
        self.shared.condvar.notify_all();
    }

    /// Re-arms `id` to fire `duration` (its last-known interval, or the
    /// provided one-shot duration) from now.
    pub fn restart(&self, id: TimerId) {
        let mut guard = self.shared.state.lock().unwrap();
        if let Some(entry) = guard.timers.get_mut(&id) {
            let wait = entry.interval.unwrap_or_else(|| entry.deadline.saturating_duration_since(Instant::now()));
            entry.deadline = Instant::now() + wait;
            entry.enabled = true;
        }
        drop(guard);
        self.shared.condvar.notify_all();
    }

    pub fn update(&self, id: TimerId, new_duration: Duration) {
        let mut guard = self.shared.state.lock().unwrap();
        if let Some(entry) = guard.timers.get_mut(&id) {
            entry.deadline = Instant::now() + new_duration;
            if entry.interval.is_some() {
                entry.interval = Some(new_duration);
            }
        }
        drop(guard);
        self.shared.condvar.notify_all();
    }

    pub fn enable(&self, id: TimerId) {
        let mut guard = self.shared.state.lock().unwrap();
        if let Some(entry) = guard.timers.get_mut(&id) {
            entry.enabled = true;
            entry.deadline = Instant::now() + entry.interval.unwrap_or(Duration::from_millis(0));
        }
        drop(guard);
        self.shared.condvar.notify_all();
    }

    pub fn disable(&self, id: TimerId) {
        let mut guard = self.shared.state.lock().unwrap();
        if let Some(entry) = guard.timers.get_mut(&id) {
            entry.enabled = false;
        }
    }

    pub fn timer_count(&self) -> usize {
        self.shared.state.lock().unwrap().timers.len()
    }

    pub fn has_timer(&self, id: TimerId) -> bool {
        self.shared.state.lock().unwrap().timers.contains_key(&id)
    }

    /// Stops the worker thread and joins it. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut guard = self.shared.state.lock().unwrap();
            guard.running = false;
        }
        self.shared.condvar.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn one_shot_timer_fires_once() {
        let manager = TimerManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        manager.add(Duration::from_millis(20), false, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_timer_fires_multiple_times() {
        let manager = TimerManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        manager.add(Duration::from_millis(15), true, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(120));
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn removed_timer_does_not_fire() {
        let manager = TimerManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = manager.add(Duration::from_millis(30), false, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        manager.remove(id);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disabled_timer_does_not_fire_until_enabled() {
        let manager = TimerManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = manager.add(Duration::from_millis(20), false, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        manager.disable(id);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        manager.enable(id);
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_callback_does_not_kill_worker() {
        let manager = TimerManager::new();
        manager.add(Duration::from_millis(10), false, || {
            panic!("boom");
        });
        std::thread::sleep(Duration::from_millis(50));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        manager.add(Duration::from_millis(10), false, move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn has_timer_and_timer_count_track_registrations() {
        let manager = TimerManager::new();
        assert_eq!(manager.timer_count(), 0);
        let id = manager.add(Duration::from_secs(10), false, || {});
        assert!(manager.has_timer(id));
        assert_eq!(manager.timer_count(), 1);
        manager.remove(id);
        assert!(!manager.has_timer(id));
    }
}
