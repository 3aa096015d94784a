//! Upstream HTTP fetching with session cookies, retries and failure diagnostics.
//!
//! # Features
//!
//! - Cookie-persistent client per site, seeded User-Agent, browser-like headers
//! - Exponential backoff with jitter for transport failures and soft statuses
//! - Classified [`UpstreamDiagnostic`] attached to every HTTP rejection
//! - Final-URL resolution (HEAD, redirects disabled), single and batched

mod constants;
mod context;
pub mod diagnostics;
mod error;
mod retry;

pub use constants::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, RETRYABLE_STATUSES};
pub use context::{FetchContext, FetchContextCache, FetchOptions, ResolveRetry};
pub use diagnostics::{DiagnosticSummary, FailureReason, UpstreamDiagnostic, UpstreamProvider, classify};
pub use error::FetchError;
pub use retry::{RetryDecision, RetryPolicy, is_retryable_status};

pub(crate) use retry::random_below;
