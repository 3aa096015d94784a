//! Constants for the fetch module (timeouts, retry budget).

use std::time::Duration;

/// Default whole-request timeout for upstream HTTP calls (15 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Retries after the first attempt for retryable failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base of the exponential backoff; retry `n` waits `base * 2^n` plus jitter.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Upper bound (exclusive) of the uniform jitter added to each retry delay.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(400);

/// Attempts per URL when resolving final URLs in a batch.
pub const DEFAULT_RESOLVE_ATTEMPTS: u32 = 3;

/// Base pause between final-URL resolution attempts.
pub const DEFAULT_RESOLVE_DELAY: Duration = Duration::from_millis(1_000);

/// Upper bound of the random extra added to the resolution pause.
pub const RESOLVE_DELAY_JITTER: Duration = Duration::from_millis(200);

/// Statuses that are always retried, whatever the method.
pub const RETRYABLE_STATUSES: &[u16] = &[403, 408, 425, 429, 500, 502, 503, 504];
