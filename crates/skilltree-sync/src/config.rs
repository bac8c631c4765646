//! Session configuration.

use crate::error::{Error, Result};
use std::time::Duration;

/// Fixed cursor colour palette. Each client picks one at random.
pub const CURSOR_COLORS: [&str; 7] = [
    "#f97316", "#22d3ee", "#a855f7", "#facc15", "#34d399", "#fb7185", "#60a5fa",
];

/// Colour used when a peer does not announce one.
pub const DEFAULT_CURSOR_COLOR: &str = CURSOR_COLORS[0];

/// Retry policy for the outbox worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per effect, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

/// Configuration for a [`TreeSession`](crate::TreeSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum gap between outgoing cursor broadcasts.
    pub cursor_interval: Duration,

    /// Minimum gap between live drag broadcasts, per node.
    pub drag_interval: Duration,

    /// Remote cursors not refreshed within this window are pruned.
    pub cursor_stale: Duration,

    /// Outbox retry policy for storage effects.
    pub retry: RetryPolicy,

    /// Display name shown to peers. Defaults to `User <last 4 of client id>`.
    pub client_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cursor_interval: Duration::from_millis(40),
            drag_interval: Duration::from_millis(60),
            cursor_stale: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
            client_name: None,
        }
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| Error::Config(format!("{name} must be a whole number of milliseconds, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

impl SessionConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// - `SKILLTREE_CURSOR_INTERVAL_MS` (40)
    /// - `SKILLTREE_DRAG_INTERVAL_MS` (60)
    /// - `SKILLTREE_CURSOR_STALE_MS` (5000)
    /// - `SKILLTREE_OUTBOX_ATTEMPTS` (3)
    /// - `SKILLTREE_OUTBOX_BACKOFF_MS` (200)
    /// - `SKILLTREE_CLIENT_NAME` (unset)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let attempts = match std::env::var("SKILLTREE_OUTBOX_ATTEMPTS") {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(Error::Config(format!(
                        "SKILLTREE_OUTBOX_ATTEMPTS must be a positive integer, got {raw:?}"
                    )))
                }
            },
            Err(_) => defaults.retry.attempts,
        };

        let client_name = std::env::var("SKILLTREE_CLIENT_NAME")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(Self {
            cursor_interval: env_millis("SKILLTREE_CURSOR_INTERVAL_MS", defaults.cursor_interval)?,
            drag_interval: env_millis("SKILLTREE_DRAG_INTERVAL_MS", defaults.drag_interval)?,
            cursor_stale: env_millis("SKILLTREE_CURSOR_STALE_MS", defaults.cursor_stale)?,
            retry: RetryPolicy {
                attempts,
                backoff: env_millis("SKILLTREE_OUTBOX_BACKOFF_MS", defaults.retry.backoff)?,
            },
            client_name,
        })
    }

    /// Set the cursor broadcast interval.
    #[must_use]
    pub fn with_cursor_interval(mut self, interval: Duration) -> Self {
        self.cursor_interval = interval;
        self
    }

    /// Set the per-node drag broadcast interval.
    #[must_use]
    pub fn with_drag_interval(mut self, interval: Duration) -> Self {
        self.drag_interval = interval;
        self
    }

    /// Set the stale-cursor window.
    #[must_use]
    pub fn with_cursor_stale(mut self, stale: Duration) -> Self {
        self.cursor_stale = stale;
        self
    }

    /// Set the outbox retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the display name announced to peers.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }
}
