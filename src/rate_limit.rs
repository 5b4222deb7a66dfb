//! Per-caller request budgets.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Endpoint classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateClass {
    /// Single-image removal.
    Remove,
    /// Multi-image removal. Lower ceiling than `Remove`, each call does more work.
    Batch,
    /// Fetching a stored result.
    Download,
}

impl RateClass {
    pub fn as_str(self) -> &'static str {
        match self {
            RateClass::Remove => "remove",
            RateClass::Batch => "batch",
            RateClass::Download => "download",
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_remove_per_window() -> u32 {
    30
}

fn default_batch_per_window() -> u32 {
    10
}

fn default_download_per_window() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    60
}

/// Requests allowed per caller per window, by class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default = "default_remove_per_window")]
    pub remove: u32,
    #[serde(default = "default_batch_per_window")]
    pub batch: u32,
    #[serde(default = "default_download_per_window")]
    pub download: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            remove: default_remove_per_window(),
            batch: default_batch_per_window(),
            download: default_download_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimits {
    pub fn limit_for(&self, class: RateClass) -> u32 {
        match class {
            RateClass::Remove => self.remove,
            RateClass::Batch => self.batch,
            RateClass::Download => self.download,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Outcome of charging one request against a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Counts requests per `(identity, class)`.
///
/// Implementations must update each counter atomically: two concurrent
/// requests from the same caller can never both take the last slot.
pub trait RateLimiter: Send + Sync {
    fn check(&self, identity: &str, class: RateClass) -> RateDecision;
}

/// Fixed-window counters in a sharded map.
///
/// Each `(identity, class)` pair owns a `(count, window_start)` slot. The
/// shard lock held by `entry` makes the read-modify-write atomic.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limits: RateLimits,
    windows: DashMap<(String, RateClass), (u32, Instant)>,
}

impl FixedWindowLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: DashMap::new(),
        }
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Drops counters whose window has already closed. Returns how many were
    /// removed.
    pub fn purge_expired(&self) -> usize {
        let window = self.limits.window();
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, (_, started)| now.duration_since(*started) < window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of live counters.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    fn check_at(&self, identity: &str, class: RateClass, now: Instant) -> RateDecision {
        let limit = self.limits.limit_for(class);
        let window = self.limits.window();

        let mut entry = self
            .windows
            .entry((identity.to_string(), class))
            .or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= window {
            *count = 0;
            *window_start = now;
        }

        if *count >= limit {
            let retry_after = window.saturating_sub(now.duration_since(*window_start));
            return RateDecision::Limited { retry_after };
        }

        *count += 1;
        RateDecision::Allowed {
            remaining: limit - *count,
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, identity: &str, class: RateClass) -> RateDecision {
        self.check_at(identity, class, Instant::now())
    }
}
