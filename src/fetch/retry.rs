//! Retry logic with exponential backoff for upstream fetches.
//!
//! Transport failures and a fixed set of statuses (403, 408, 425, 429, 500,
//! 502, 503, 504) are retried; idempotent requests are additionally retried on
//! any 5xx. Everything else surfaces immediately.
//!
//! # Example
//!
//! ```
//! use reqwest::Method;
//! use scrapist_core::fetch::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.decide_for_status(503, &Method::GET, 0) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retry #{attempt} in {delay:?}");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use reqwest::Method;
use tracing::debug;

use super::FetchError;
use super::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_JITTER, RETRYABLE_STATUSES,
};

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which retry this will be (1 for the first retry).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason, for logs.
        reason: String,
    },
}

/// Retry configuration for a fetch context.
///
/// # Delay Calculation
///
/// ```text
/// delay(n) = base_delay * 2^n + uniform[0, max_jitter)
/// ```
///
/// With defaults the retries wait roughly 200ms, 400ms and 800ms, each plus
/// up to 400ms of jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    max_retries: u32,
    base_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_jitter,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Returns the number of retries allowed after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides whether a failed request should be retried.
    ///
    /// `retries_done` is the number of retries already performed (0 after the
    /// first attempt fails).
    #[must_use]
    pub fn decide(&self, error: &FetchError, method: &Method, retries_done: u32) -> RetryDecision {
        match error {
            FetchError::Transport { .. } => self.schedule(retries_done),
            FetchError::Http { diagnostic } => {
                self.decide_for_status(diagnostic.status, method, retries_done)
            }
            FetchError::ClientBuild(_) => RetryDecision::DoNotRetry {
                reason: "client construction failed - retry would not help".to_string(),
            },
        }
    }

    /// Status-only variant of [`decide`](Self::decide).
    #[must_use]
    pub fn decide_for_status(&self, status: u16, method: &Method, retries_done: u32) -> RetryDecision {
        if is_retryable_status(status, method) {
            self.schedule(retries_done)
        } else {
            RetryDecision::DoNotRetry {
                reason: format!("HTTP {status} is not retryable"),
            }
        }
    }

    fn schedule(&self, retries_done: u32) -> RetryDecision {
        if retries_done >= self.max_retries {
            debug!(retries_done, max = self.max_retries, "retry budget exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let attempt = retries_done + 1;
        let delay = self.calculate_delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "will retry");
        RetryDecision::Retry { delay, attempt }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor) + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        random_below(self.max_jitter)
    }
}

/// Whether a status is worth retrying for the given method.
#[must_use]
pub fn is_retryable_status(status: u16, method: &Method) -> bool {
    if RETRYABLE_STATUSES.contains(&status) {
        return true;
    }
    is_idempotent(method) && (status == 429 || (500..=599).contains(&status))
}

fn is_idempotent(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::PUT, Method::DELETE].contains(method)
}

/// Uniform duration in `[0, bound)`; zero when `bound` is zero.
pub(crate) fn random_below(bound: Duration) -> Duration {
    let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
}
