//! Process-level state shared by scrapers: settings, the browser executor
//! and the per-origin fetch-context cache.
//!
//! Build one [`ScraperRuntime`] at startup and hand an `Arc` of it to every
//! [`Scraper`](crate::Scraper). Tests build their own isolated runtimes.

use std::sync::Arc;

use tracing::instrument;

use crate::browser::BrowserFallback;
use crate::config::ScraperSettings;
use crate::fetch::{FetchContextCache, FetchError, ResolveRetry};

/// Shared scraping state with an explicit lifecycle.
#[derive(Debug)]
pub struct ScraperRuntime {
    settings: ScraperSettings,
    browser: Arc<BrowserFallback>,
    contexts: FetchContextCache,
}

impl ScraperRuntime {
    /// A runtime driving the build's default browser launcher.
    #[must_use]
    pub fn new(settings: ScraperSettings) -> Self {
        Self::with_browser(settings, Arc::new(BrowserFallback::default()))
    }

    /// A runtime using the given browser executor.
    #[must_use]
    pub fn with_browser(settings: ScraperSettings, browser: Arc<BrowserFallback>) -> Self {
        Self {
            settings,
            browser,
            contexts: FetchContextCache::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    #[must_use]
    pub fn browser(&self) -> &Arc<BrowserFallback> {
        &self.browser
    }

    #[must_use]
    pub fn contexts(&self) -> &FetchContextCache {
        &self.contexts
    }

    /// Where `url` redirects to, using the cached context for `reference`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the HEAD request fails.
    pub async fn resolve_final_url(&self, url: &str, reference: &str) -> Result<String, FetchError> {
        self.contexts.resolve_final_url(url, reference).await
    }

    /// Batch form of [`resolve_final_url`](Self::resolve_final_url); failures become `""`.
    pub async fn resolve_final_urls(&self, urls: &[String], reference: &str, retry: ResolveRetry) -> Vec<String> {
        self.contexts.resolve_final_urls(urls, reference, retry).await
    }

    /// Closes the browser and forgets cached fetch contexts.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.browser.shutdown().await;
        self.contexts.clear();
    }
}

impl Default for ScraperRuntime {
    fn default() -> Self {
        Self::new(ScraperSettings::default())
    }
}
