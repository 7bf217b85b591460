//! Per-identity cooldown gate for attendance events.
//!
//! An identity is logged at most once per interval, measured from its last
//! *accepted* event. Timestamps are milliseconds on a caller-chosen clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Reference cooldown between two logged events for the same identity.
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Storage for the last accepted timestamp of each identity.
pub trait DebounceStore: Send + Sync {
    fn get(&self, name: &str) -> Option<u64>;

    fn set(&self, name: &str, timestamp_ms: u64);

    /// Store `new` for `name` only if the current value is still `expected`.
    /// Must be atomic with respect to other calls for the same name.
    fn compare_and_set(&self, name: &str, expected: Option<u64>, new: u64) -> bool;

    /// Forget every identity.
    fn clear(&self);
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryDebounceStore {
    last: Mutex<HashMap<String, u64>>,
}

impl MemoryDebounceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DebounceStore for MemoryDebounceStore {
    fn get(&self, name: &str) -> Option<u64> {
        self.map().get(name).copied()
    }

    fn set(&self, name: &str, timestamp_ms: u64) {
        self.map().insert(name.to_string(), timestamp_ms);
    }

    fn compare_and_set(&self, name: &str, expected: Option<u64>, new: u64) -> bool {
        let mut map = self.map();
        if map.get(name).copied() != expected {
            return false;
        }
        map.insert(name.to_string(), new);
        true
    }

    fn clear(&self) {
        self.map().clear();
    }
}

/// Where an identity stands relative to its cooldown window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    /// Never logged.
    Unseen,
    /// Logged before, window elapsed.
    CooledDown,
    /// Logged within the window. `remaining_ms` is 0 when the clock went
    /// backwards.
    InCooldown { remaining_ms: u64 },
}

/// Decides whether a match becomes a logged attendance event.
pub struct Debouncer<S = MemoryDebounceStore> {
    store: S,
    interval_ms: u64,
}

impl Debouncer<MemoryDebounceStore> {
    pub fn new(interval: Duration) -> Self {
        Self::with_store(MemoryDebounceStore::new(), interval)
    }
}

impl Default for Debouncer<MemoryDebounceStore> {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

impl<S: DebounceStore> Debouncer<S> {
    pub fn with_store(store: S, interval: Duration) -> Self {
        Self {
            store,
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current state of `name` at time `now_ms`, without changing it.
    pub fn state(&self, name: &str, now_ms: u64) -> CooldownState {
        match self.store.get(name) {
            None => CooldownState::Unseen,
            Some(last) => self.classify(last, now_ms),
        }
    }

    fn classify(&self, last: u64, now_ms: u64) -> CooldownState {
        match now_ms.checked_sub(last) {
            Some(elapsed) if elapsed >= self.interval_ms => CooldownState::CooledDown,
            Some(elapsed) => CooldownState::InCooldown {
                remaining_ms: self.interval_ms - elapsed,
            },
            // Clock went backwards: still inside the window.
            None => CooldownState::InCooldown { remaining_ms: 0 },
        }
    }

    /// Returns `true` and records `now_ms` if `name` may be logged now.
    pub fn should_log(&self, name: &str, now_ms: u64) -> bool {
        loop {
            let last = self.store.get(name);
            if let Some(last) = last {
                if let CooldownState::InCooldown { remaining_ms } = self.classify(last, now_ms) {
                    tracing::trace!(name, now_ms, remaining_ms, "attendance suppressed");
                    return false;
                }
            }
            if self.store.compare_and_set(name, last, now_ms) {
                return true;
            }
            // Another caller updated this name in between; decide again.
        }
    }

    /// Forget all identities.
    pub fn reset(&self) {
        self.store.clear();
    }
}
