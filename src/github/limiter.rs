//! Request limiter shared by every call made through one client.
//!
//! GitHub's secondary rate limits punish bursts of concurrent requests from
//! a single installation. Every request therefore takes a permit before it
//! reaches the transport:
//!
//! - at most `max_concurrent` requests are in flight at once;
//! - consecutive request starts are at least `min_time` apart;
//! - waiters are served in FIFO order.
//!
//! The defaults (one request at a time, one second apart) mean requests from
//! different plugins sharing a client simply queue up behind each other.

use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

/// Limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum number of requests in flight.
    pub max_concurrent: usize,

    /// Minimum spacing between request starts.
    pub min_time: Duration,
}

impl LimiterConfig {
    /// One request at a time, at least one second apart.
    pub const DEFAULT: Self = Self {
        max_concurrent: 1,
        min_time: Duration::from_millis(1000),
    };

    /// No spacing between requests. Concurrency stays capped at one.
    pub const UNTHROTTLED: Self = Self {
        max_concurrent: 1,
        min_time: Duration::ZERO,
    };

    pub fn new(max_concurrent: usize, min_time: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            min_time,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// FIFO concurrency and spacing limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    permits: Semaphore,
    /// Earliest instant the next request may start.
    next_start: Mutex<Option<Instant>>,
}

/// Held for the duration of one request; dropping it frees the slot.
#[derive(Debug)]
pub struct RatePermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            next_start: Mutex::new(None),
        }
    }

    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Waits for a free slot and for the spacing interval to elapse.
    ///
    /// Both the semaphore and the mutex are fair, so callers are released in
    /// the order they called `acquire`.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("limiter semaphore is never closed");

        let mut next_start = self.next_start.lock().await;
        if let Some(at) = *next_start {
            tokio::time::sleep_until(at).await;
        }
        *next_start = Some(Instant::now() + self.config.min_time);

        RatePermit { _permit: permit }
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
