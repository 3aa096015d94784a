//! Error types for scrape calls.
//!
//! Every failure that reaches a caller carries enough context (url, method,
//! request label, diagnostic when there is one) for an API boundary to pick a
//! status and render a message. The engine itself produces no user-facing prose.

use thiserror::Error;

use crate::browser::BrowserError;
use crate::fetch::{FetchError, UpstreamDiagnostic};

/// Errors surfaced by [`Scraper::scrape`](super::Scraper::scrape).
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// robots.txt forbids the target path. No request was sent.
    #[error("robots.txt disallows {path} on {url}")]
    RobotsDenied {
        /// The blocked path.
        path: String,
        /// The resolved request target.
        url: String,
    },

    /// The upstream answered but the body was empty.
    #[error("upstream sent no content for {url}")]
    EmptyUpstreamBody {
        /// The resolved request target.
        url: String,
    },

    /// Transport or classified HTTP failure after the retry budget was spent.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The browser was the preferred path and could not be started.
    #[error("browser fallback unavailable: {0}")]
    BrowserUnavailable(#[source] BrowserError),

    /// The parser found nothing matching on the page.
    #[error("no matching data found")]
    EmptyResultSet,

    /// Malformed caller input.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ScrapeError {
    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status an API boundary should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RobotsDenied { .. } => 403,
            Self::EmptyUpstreamBody { .. } => 502,
            Self::Fetch(error) => error.status().unwrap_or(500),
            Self::BrowserUnavailable(_) => 503,
            Self::EmptyResultSet => 404,
            Self::InvalidParameter { .. } => 400,
        }
    }

    /// The upstream diagnostic, for classified HTTP failures.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&UpstreamDiagnostic> {
        match self {
            Self::Fetch(error) => error.diagnostic(),
            _ => None,
        }
    }
}

/// Fails with [`ScrapeError::EmptyResultSet`] unless `found`.
///
/// # Errors
///
/// Returns [`ScrapeError::EmptyResultSet`] when `found` is false.
pub fn ensure_found(found: bool) -> Result<(), ScrapeError> {
    if found {
        Ok(())
    } else {
        Err(ScrapeError::EmptyResultSet)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderMap;

    use super::*;
    use crate::browser::BrowserProvider;
    use crate::fetch::{FailureReason, classify};

    #[test]
    fn test_status_codes() {
        let denied = ScrapeError::RobotsDenied {
            path: "/private".to_string(),
            url: "https://x.test/private".to_string(),
        };
        assert_eq!(denied.status_code(), 403);
        assert_eq!(
            ScrapeError::EmptyUpstreamBody { url: "https://x.test".to_string() }.status_code(),
            502
        );
        assert_eq!(ScrapeError::EmptyResultSet.status_code(), 404);
        assert_eq!(ScrapeError::invalid_parameter("page", "not a number").status_code(), 400);
        assert_eq!(
            ScrapeError::BrowserUnavailable(BrowserError::UnsupportedProvider(BrowserProvider::Firefox))
                .status_code(),
            503
        );
    }

    #[test]
    fn test_http_failure_keeps_upstream_status_and_diagnostic() {
        let error = ScrapeError::from(FetchError::http(classify(429, &HeaderMap::new(), "")));
        assert_eq!(error.status_code(), 429);
        assert_eq!(error.diagnostic().unwrap().reason, FailureReason::RateLimited);
    }

    #[test]
    fn test_ensure_found() {
        assert!(ensure_found(true).is_ok());
        assert!(matches!(ensure_found(false), Err(ScrapeError::EmptyResultSet)));
    }
}
