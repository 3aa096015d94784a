//! Per-engine concurrency queue and request pacing.
//!
//! A [`RequestQueue`] bounds how many upstream requests one scraper runs at
//! once, optionally caps how many may start within a sliding time window, and
//! waits a random `[0, jitter)` before each request so traffic does not arrive
//! on a fixed beat.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use scrapist_core::rate_limiter::{RateLimitConfig, RequestQueue};
//!
//! # async fn example() {
//! let queue = RequestQueue::new(&RateLimitConfig {
//!     max_concurrent: 2,
//!     interval: Some(Duration::from_secs(1)),
//!     interval_cap: Some(4),
//!     jitter_ms: Some(350),
//! });
//! let body = queue.run(|| async { "fetched" }).await;
//! assert_eq!(body, "fetched");
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::fetch::random_below;

/// Rate-limit settings for one scraper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed in flight at once; values below 1 are treated as 1.
    pub max_concurrent: usize,
    /// Sliding window length for start-rate limiting.
    #[serde(with = "optional_millis")]
    pub interval: Option<Duration>,
    /// Starts allowed per window; defaults to `max_concurrent`.
    pub interval_cap: Option<usize>,
    /// Upper bound of the random pre-request delay, in milliseconds.
    pub jitter_ms: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            interval: None,
            interval_cap: None,
            jitter_ms: None,
        }
    }
}

impl RateLimitConfig {
    /// The jitter bound as a duration (zero when unset).
    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms.unwrap_or(0))
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.filter(|ms| *ms > 0).map(Duration::from_millis))
    }
}

/// Concurrency gate plus optional sliding start window.
///
/// Admission is FIFO; completion order follows request latency.
#[derive(Debug)]
pub struct RequestQueue {
    max_concurrent: usize,
    permits: Semaphore,
    window: Option<SlidingWindow>,
    jitter: Duration,
}

#[derive(Debug)]
struct SlidingWindow {
    interval: Duration,
    cap: usize,
    starts: Mutex<VecDeque<Instant>>,
}

impl SlidingWindow {
    async fn admit(&self) {
        loop {
            let wake_at = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();
                while starts.front().is_some_and(|start| now.duration_since(*start) >= self.interval) {
                    starts.pop_front();
                }
                if starts.len() < self.cap {
                    starts.push_back(now);
                    return;
                }
                match starts.front() {
                    Some(oldest) => *oldest + self.interval,
                    None => return,
                }
            };
            debug!(cap = self.cap, "start window full, waiting");
            tokio::time::sleep_until(wake_at).await;
        }
    }
}

impl RequestQueue {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        let window = config.interval.filter(|interval| !interval.is_zero()).map(|interval| SlidingWindow {
            interval,
            cap: config.interval_cap.unwrap_or(max_concurrent).max(1),
            starts: Mutex::new(VecDeque::new()),
        });
        Self {
            max_concurrent,
            permits: Semaphore::new(max_concurrent),
            window,
            jitter: config.jitter(),
        }
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs `task` once admitted: waits for a concurrency slot, then for room
    /// in the start window, then for the jitter delay.
    #[instrument(level = "trace", skip_all)]
    pub async fn run<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // The semaphore is never closed, so acquisition only fails if that changes.
        let _permit = self.permits.acquire().await.ok();
        if let Some(window) = &self.window {
            window.admit().await;
        }
        jitter_delay(self.jitter).await;
        task().await
    }
}

/// Sleeps for a uniformly random duration in `[0, bound)`.
pub async fn jitter_delay(bound: Duration) {
    let wait = random_below(bound);
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
}
