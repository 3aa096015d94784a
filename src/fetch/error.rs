//! Error types for upstream fetches.
//!
//! A failed fetch is either a transport failure (no HTTP status was ever
//! received) or an HTTP failure that carries a classified
//! [`UpstreamDiagnostic`]. The two are kept apart on purpose: network errors
//! are never given a diagnostic.

use thiserror::Error;

use super::diagnostics::UpstreamDiagnostic;

/// Errors that can occur while fetching from an upstream site.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure: DNS, refused connection, TLS, timeout, body read.
    #[error("network error on {method} {url}: {source}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// HTTP method, uppercase.
        method: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a rejecting status.
    #[error("HTTP {} ({}) on {}", .diagnostic.status, .diagnostic.reason, .diagnostic.url.as_deref().unwrap_or("<unknown url>"))]
    Http {
        /// Classification of the rejection.
        diagnostic: Box<UpstreamDiagnostic>,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl FetchError {
    /// Creates a transport error.
    pub fn transport(url: impl Into<String>, method: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            method: method.into(),
            source,
        }
    }

    /// Creates an HTTP failure from a diagnostic.
    #[must_use]
    pub fn http(diagnostic: UpstreamDiagnostic) -> Self {
        Self::Http {
            diagnostic: Box::new(diagnostic),
        }
    }

    /// The diagnostic, for HTTP failures.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&UpstreamDiagnostic> {
        match self {
            Self::Http { diagnostic } => Some(diagnostic),
            Self::Transport { .. } | Self::ClientBuild(_) => None,
        }
    }

    /// The upstream status, for HTTP failures.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.diagnostic().map(|diagnostic| diagnostic.status)
    }

    /// Re-labels the diagnostic of an HTTP failure; other variants pass through.
    #[must_use]
    pub fn with_request(self, url: &str, method: &str, request_label: Option<String>) -> Self {
        match self {
            Self::Http { diagnostic } => Self::http(diagnostic.with_request(url, method, request_label)),
            other => other,
        }
    }
}
