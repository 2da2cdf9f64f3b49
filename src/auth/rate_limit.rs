//! Sliding-window rate limiting for sensitive endpoints.
//!
//! Counters are process-local and keyed by (client address, endpoint
//! class). Each `allow` call is one critical section per key, so the
//! increment-then-compare sequence cannot under-count under load. The
//! narrow interface keeps callers oblivious to the backing map, which
//! could later move to a distributed cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::{Error, Result};

/// Window and budget for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

/// Outcome of one `allow` call.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub permitted: bool,
    /// How long the caller should wait before retrying, present on rejection
    pub retry_after: Option<Duration>,
    /// Requests left in the current window
    pub remaining: u32,
}

impl RateLimitDecision {
    /// Convert a rejection into the typed rate-limit error.
    pub fn check(&self) -> Result<()> {
        if self.permitted {
            Ok(())
        } else {
            Err(Error::rate_limited(
                "Too many requests, slow down",
                self.retry_after.map(|d| d.as_millis() as u64),
            ))
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    window_start: Instant,
    count: u32,
    window: Duration,
}

impl WindowEntry {
    fn elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.window_start)
    }

    fn expired(&self, now: Instant) -> bool {
        self.elapsed(now) >= self.window
    }
}

/// Process-local sliding-window request counter.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against the key's window and decide whether it may
    /// proceed. An absent or elapsed window resets to a fresh one with this
    /// request as its first.
    pub fn allow(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            window_start: now,
            count: 0,
            window: policy.window,
        });

        if entry.expired(now) {
            entry.window_start = now;
            entry.count = 0;
            entry.window = policy.window;
        }

        entry.count += 1;

        if entry.count <= policy.max_requests {
            RateLimitDecision {
                permitted: true,
                retry_after: None,
                remaining: policy.max_requests - entry.count,
            }
        } else {
            let retry_after = policy.window.saturating_sub(entry.elapsed(now));
            debug!(key, count = entry.count, "request rejected by rate limiter");
            RateLimitDecision { permitted: false, retry_after: Some(retry_after), remaining: 0 }
        }
    }

    /// Give back one slot in the key's live window. Used by endpoints that
    /// only count failed outcomes; called after the business outcome is
    /// known, never at request entry.
    pub fn refund(&self, key: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        if let Some(entry) = entries.get_mut(key) {
            if !entry.expired(now) && entry.count > 0 {
                entry.count -= 1;
            }
        }
    }

    /// Drop windows that have elapsed. Only needed for memory bounds;
    /// correctness never depends on it. Returns the number of keys removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now));
        before - entries.len()
    }
}
