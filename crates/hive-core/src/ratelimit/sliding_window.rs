//! Sliding window rate limiter
//!
//! Keeps the timestamps of each key's requests inside a trailing window and
//! admits a request only while fewer than `max_requests` remain in it.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window width in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests still available in the current window
    pub remaining: u32,
    /// Milliseconds until the oldest request leaves the window (0 when allowed)
    pub wait_time_ms: u64,
}

/// Sliding window limiter keyed by caller identity
///
/// Each key lives in its own map entry, so checks for unrelated keys do not
/// contend, and a check mutates its entry under that entry's lock.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and, if allowed, record a request for `key` now
    pub fn check_limit(&self, key: &str) -> RateLimitDecision {
        self.check_limit_at(key, Instant::now())
    }

    /// Check and record a request for `key` at an explicit instant
    pub fn check_limit_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let window = self.config.window();
        let max = self.config.max_requests as usize;

        let mut timestamps = self.entries.entry(key.to_string()).or_default();
        purge_expired(&mut timestamps, now, window);

        if timestamps.len() < max {
            timestamps.push_back(now);
            return RateLimitDecision {
                allowed: true,
                remaining: (max - timestamps.len()) as u32,
                wait_time_ms: 0,
            };
        }

        let wait = timestamps
            .front()
            .map(|oldest| (*oldest + window).saturating_duration_since(now))
            .unwrap_or(window);
        let wait_time_ms = (wait.as_millis() as u64).max(1);

        debug!(
            "Rate limit hit for {}: {} requests in window, retry in {}ms",
            key,
            timestamps.len(),
            wait_time_ms
        );

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            wait_time_ms,
        }
    }

    /// Restore full quota for one key
    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Forget every key
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop keys whose requests have all aged out
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let window = self.config.window();
        let before = self.entries.len();
        self.entries.retain(|_, timestamps| {
            purge_expired(timestamps, now, window);
            !timestamps.is_empty()
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            info!("Pruned {} idle rate limit entries", removed);
        }
        removed
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

fn purge_expired(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.saturating_duration_since(*oldest) < window {
            break;
        }
        timestamps.pop_front();
    }
}
