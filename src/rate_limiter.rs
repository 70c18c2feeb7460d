//! Fixed-window request limiting keyed by client identity.
//!
//! Records live in a [`DashMap`]; the check-and-increment for a key happens
//! while holding that key's shard lock, so two concurrent requests from the
//! same client can never both observe an empty window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_requests: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Windows shorter than one second are raised to one second.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window: window.max(Duration::from_secs(1)),
        }
    }

    /// One request per minute.
    pub fn per_minute() -> Self {
        Self::new(1, Duration::from_secs(60))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitRecord {
    pub client_key: String,
    pub window_start: Instant,
    pub count: u32,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Rate limit exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    /// Whole seconds to wait, rounded up and never zero.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    policy: RateLimitPolicy,
    records: DashMap<String, RateLimitRecord>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                records: DashMap::new(),
                clock,
            }),
        }
    }

    /// Admit or reject a request from `client_key` at the limiter's current time.
    pub fn check(&self, client_key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(client_key, self.inner.clock.now())
    }

    pub fn check_at(&self, client_key: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let policy = self.inner.policy;
        let mut record = self
            .inner
            .records
            .entry(client_key.to_string())
            .or_insert_with(|| RateLimitRecord {
                client_key: client_key.to_string(),
                window_start: now,
                count: 0,
            });

        let elapsed = now.saturating_duration_since(record.window_start);
        if elapsed >= policy.window {
            record.window_start = now;
            record.count = 0;
        }

        if record.count >= policy.max_requests {
            let elapsed = now.saturating_duration_since(record.window_start);
            return Err(RateLimitExceeded {
                retry_after: policy.window.saturating_sub(elapsed),
            });
        }

        record.count += 1;
        Ok(())
    }

    /// Drop records whose window has fully elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(self.inner.clock.now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let window = self.inner.policy.window;
        let before = self.inner.records.len();
        self.inner
            .records
            .retain(|_, record| now.saturating_duration_since(record.window_start) < window);
        before.saturating_sub(self.inner.records.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.records.len()
    }
}

/// Periodically evict expired records so memory follows the number of active clients.
pub fn spawn_purge_task(
    rate_limiter: RateLimiter,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = rate_limiter.purge_expired();
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = rate_limiter.tracked_clients(),
                    "Purged expired rate limit records"
                );
            }
        }
    })
}
