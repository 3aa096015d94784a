//! Browser fallback configuration types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::user_agent::BROWSER_USER_AGENT;

/// Default navigation timeout for rendered fetches.
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 25_000;

/// Browser engine to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserProvider {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chromium" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" => Ok(Self::Webkit),
            other => Err(format!("unknown browser provider: {other}")),
        }
    }
}

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// The DOM is parsed (`interactive` ready state or later).
    #[default]
    DomContentLoaded,
    /// `load` fired and the network has been quiet for a moment.
    NetworkIdle,
}

impl WaitUntil {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitUntil {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(Self::Load),
            "domcontentloaded" => Ok(Self::DomContentLoaded),
            "networkidle" => Ok(Self::NetworkIdle),
            other => Err(format!("unknown wait condition: {other}")),
        }
    }
}

/// Settings for rendered fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserFallbackConfig {
    pub enabled: bool,
    pub provider: BrowserProvider,
    pub wait_until: WaitUntil,
    pub navigation_timeout_ms: u64,
    /// Run without a visible window (default: true).
    pub headless: bool,
    /// User-Agent for the isolated browsing context.
    pub user_agent: String,
}

impl Default for BrowserFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: BrowserProvider::default(),
            wait_until: WaitUntil::default(),
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            headless: true,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl BrowserFallbackConfig {
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Per-scraper overrides laid over the process-wide [`BrowserFallbackConfig`].
///
/// The provider is deliberately absent: one browser serves every scraper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrowserFallbackOverrides {
    pub enabled: Option<bool>,
    pub wait_until: Option<WaitUntil>,
    pub navigation_timeout_ms: Option<u64>,
    pub headless: Option<bool>,
    pub user_agent: Option<String>,
}

impl BrowserFallbackOverrides {
    /// Merges these overrides onto `base`.
    #[must_use]
    pub fn apply(&self, base: &BrowserFallbackConfig) -> BrowserFallbackConfig {
        BrowserFallbackConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            provider: base.provider,
            wait_until: self.wait_until.unwrap_or(base.wait_until),
            navigation_timeout_ms: self.navigation_timeout_ms.unwrap_or(base.navigation_timeout_ms),
            headless: self.headless.unwrap_or(base.headless),
            user_agent: self.user_agent.clone().unwrap_or_else(|| base.user_agent.clone()),
        }
    }
}
