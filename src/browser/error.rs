//! Error types for rendered (browser) fetches.

use thiserror::Error;

use super::config::BrowserProvider;

/// Errors from the browser fallback path.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Fallback is switched off for this scraper.
    #[error("browser fallback is disabled")]
    Disabled,

    /// This build has no browser automation support.
    #[error("browser automation is not available in this build (enable the `browser` feature)")]
    Unavailable,

    /// The configured provider cannot be driven.
    #[error("browser provider '{0}' is not supported")]
    UnsupportedProvider(BrowserProvider),

    /// The browser process could not be started.
    #[error("failed to launch {provider} browser: {message}")]
    Launch {
        provider: BrowserProvider,
        message: String,
    },

    /// Navigation failed before a document was available.
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// Navigation did not finish within the configured timeout.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// Any other failure talking to the browser.
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    /// Creates a launch error.
    pub fn launch(provider: BrowserProvider, message: impl Into<String>) -> Self {
        Self::Launch {
            provider,
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error from anything displayable.
    pub fn protocol(error: impl std::fmt::Display) -> Self {
        Self::Protocol(error.to_string())
    }

    /// True when the automation dependency itself could not be brought up.
    #[must_use]
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::UnsupportedProvider(_) | Self::Launch { .. }
        )
    }
}
