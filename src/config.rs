//! Startup settings shared by every scraper in the process.
//!
//! Read once (usually via [`ScraperSettings::from_env`]) and passed to a
//! [`ScraperRuntime`](crate::ScraperRuntime); nothing here is global.

use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::browser::BrowserFallbackConfig;

/// Default upper bound of the pre-request jitter for rate-limited scrapers.
pub const DEFAULT_JITTER_MS: u64 = 350;

/// Process-wide scraper settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Honour robots.txt for same-origin targets.
    pub respect_robots_txt: bool,
    /// Jitter bound applied to rate limits that do not set their own.
    pub default_jitter_ms: u64,
    pub browser_fallback: BrowserFallbackConfig,
    /// Whether site parsers should emit API-side `href` links.
    pub include_href: bool,
    /// Whether site parsers should emit upstream source URLs.
    pub include_source_url: bool,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            default_jitter_ms: DEFAULT_JITTER_MS,
            browser_fallback: BrowserFallbackConfig::default(),
            include_href: true,
            include_source_url: true,
        }
    }
}

impl ScraperSettings {
    /// Reads `SCRAPER_*` variables from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    ///
    /// Unset variables keep their defaults. Booleans are true for `1`, `true`,
    /// `yes` or `on` (any case) and false otherwise; unparseable numbers and
    /// unknown names fall back to the default.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let browser = defaults.browser_fallback.clone();

        Self {
            respect_robots_txt: bool_var(&lookup, "SCRAPER_RESPECT_ROBOTS", defaults.respect_robots_txt),
            default_jitter_ms: parsed_var(&lookup, "SCRAPER_RATE_LIMIT_JITTER_MS", defaults.default_jitter_ms),
            browser_fallback: BrowserFallbackConfig {
                enabled: bool_var(&lookup, "SCRAPER_BROWSER_FALLBACK", browser.enabled),
                provider: parsed_var(&lookup, "SCRAPER_BROWSER_PROVIDER", browser.provider),
                wait_until: parsed_var(&lookup, "SCRAPER_BROWSER_WAIT_UNTIL", browser.wait_until),
                navigation_timeout_ms: parsed_var(
                    &lookup,
                    "SCRAPER_BROWSER_TIMEOUT_MS",
                    browser.navigation_timeout_ms,
                ),
                headless: bool_var(&lookup, "SCRAPER_BROWSER_HEADLESS", browser.headless),
                user_agent: lookup("SCRAPER_BROWSER_UA").unwrap_or(browser.user_agent),
            },
            ..defaults
        }
    }
}

fn bool_var(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |value| {
        matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

fn parsed_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(value) = lookup(key) else {
        return default;
    };
    value.trim().parse().unwrap_or_else(|_| {
        warn!(key, value = %value, "ignoring unparseable setting");
        default
    })
}
