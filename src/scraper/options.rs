//! Per-scraper and per-call options.

use std::time::Duration;

use crate::browser::BrowserFallbackOverrides;
use crate::fetch::RetryPolicy;
use crate::rate_limiter::RateLimitConfig;

/// Construction options for a [`Scraper`](super::Scraper).
///
/// ```
/// use std::time::Duration;
/// use scrapist_core::rate_limiter::RateLimitConfig;
/// use scrapist_core::ScraperOptions;
///
/// let options = ScraperOptions::default()
///     .with_label("otakudesu")
///     .with_warmup_path("/")
///     .with_timeout(Duration::from_secs(20))
///     .with_rate_limit(RateLimitConfig { max_concurrent: 2, ..RateLimitConfig::default() });
/// assert_eq!(options.label.as_deref(), Some("otakudesu"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScraperOptions {
    /// `Origin` header; defaults to the base URL.
    pub origin: Option<String>,
    /// `Referer` header; defaults to `<base>/`.
    pub referer: Option<String>,
    pub headers_extra: Vec<(String, String)>,
    /// Single warmup path, visited after [`warmup_paths`](Self::warmup_paths).
    pub warmup_path: Option<String>,
    pub warmup_paths: Vec<String>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub rate_limit: Option<RateLimitConfig>,
    pub browser_fallback: BrowserFallbackOverrides,
    /// Prefix for request labels (`"<label>:<path>"`).
    pub label: Option<String>,
}

impl ScraperOptions {
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers_extra.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_warmup_path(mut self, path: impl Into<String>) -> Self {
        self.warmup_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_warmup_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warmup_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    #[must_use]
    pub fn with_browser_fallback(mut self, overrides: BrowserFallbackOverrides) -> Self {
        self.browser_fallback = overrides;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Warmup paths in visiting order with empty entries dropped.
    #[must_use]
    pub fn resolved_warmup_paths(&self) -> Vec<String> {
        self.warmup_paths
            .iter()
            .chain(self.warmup_path.iter())
            .filter(|path| !path.is_empty())
            .cloned()
            .collect()
    }
}

/// Options for one [`scrape`](super::Scraper::scrape) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// Permit a browser rescue (or browser-first fetch) for this call.
    pub allow_browser_fallback: bool,
    /// Try the browser before plain HTTP.
    pub prefer_browser: bool,
    /// Skip the robots.txt check for this call.
    pub skip_robots_check: bool,
    /// Overrides the label used in logs and diagnostics.
    pub request_label: Option<String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            allow_browser_fallback: true,
            prefer_browser: false,
            skip_robots_check: false,
            request_label: None,
        }
    }
}

impl ScrapeOptions {
    /// Browser first, HTTP only if rendering yields nothing.
    #[must_use]
    pub fn browser_first() -> Self {
        Self {
            prefer_browser: true,
            ..Self::default()
        }
    }

    /// Plain HTTP only.
    #[must_use]
    pub fn http_only() -> Self {
        Self {
            allow_browser_fallback: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_paths_merge_and_drop_empty() {
        let options = ScraperOptions::default()
            .with_warmup_paths(["/", "", "/anime"])
            .with_warmup_path("/ongoing");
        assert_eq!(options.resolved_warmup_paths(), ["/", "/anime", "/ongoing"]);
        assert!(ScraperOptions::default().with_warmup_path("").resolved_warmup_paths().is_empty());
    }

    #[test]
    fn test_scrape_option_presets() {
        let default = ScrapeOptions::default();
        assert!(default.allow_browser_fallback);
        assert!(!default.prefer_browser);
        assert!(ScrapeOptions::browser_first().prefer_browser);
        assert!(!ScrapeOptions::http_only().allow_browser_fallback);
    }
}
