//! Per-key send throttles for high-frequency presence traffic.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Allows at most one event per key per `interval`.
///
/// Events inside the window are dropped, not delayed.
#[derive(Debug, Clone)]
pub struct Throttle<K> {
    interval: Duration,
    last: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Throttle<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record and allow the event if the key's window has elapsed.
    pub fn allow(&mut self, key: K, now: Instant) -> bool {
        match self.last.get(&key) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                self.last.insert(key, now);
                true
            }
        }
    }

    /// Forget a key, e.g. when its node is deleted.
    pub fn forget(&mut self, key: &K) {
        self.last.remove(key);
    }
}
