//! Headless-browser fallback for pages plain HTTP cannot obtain.
//!
//! One [`BrowserFallback`] owns at most one live browser, keyed by
//! `(provider, headless)`, and renders one page at a time no matter how many
//! scrapers share it. Each fetch runs in a fresh isolated browsing context
//! that is torn down afterwards; the browser process itself is kept until
//! [`BrowserFallback::shutdown`].
//!
//! The automation surface is expressed as traits ([`BrowserLauncher`],
//! [`BrowserHandle`], [`BrowserContext`], [`BrowserPage`]) so the executor can
//! be driven by Chromium over CDP in production and by an in-process fake in
//! tests.

mod config;
mod error;

#[cfg(feature = "browser")]
mod chromium;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

pub use config::{
    BrowserFallbackConfig, BrowserFallbackOverrides, BrowserProvider, DEFAULT_NAVIGATION_TIMEOUT_MS,
    WaitUntil,
};
pub use error::BrowserError;

#[cfg(feature = "browser")]
pub use chromium::ChromiumLauncher;

use crate::fetch::random_below;

const SETTLE_BASE: Duration = Duration::from_millis(250);
const SETTLE_JITTER: Duration = Duration::from_millis(400);

/// Navigation parameters for [`BrowserPage::goto`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
    pub referer: Option<String>,
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, provider: BrowserProvider, headless: bool) -> Result<Arc<dyn BrowserHandle>, BrowserError>;
}

/// A running browser.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Opens an isolated context with its own cookies and User-Agent.
    async fn new_context(&self, user_agent: &str) -> Result<Box<dyn BrowserContext>, BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// An isolated browsing context.
#[async_trait]
pub trait BrowserContext: Send {
    async fn set_extra_http_headers(&mut self, headers: &BTreeMap<String, String>) -> Result<(), BrowserError>;

    async fn new_page(&mut self) -> Result<Box<dyn BrowserPage>, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// A tab inside a [`BrowserContext`].
#[async_trait]
pub trait BrowserPage: Send {
    async fn goto(&mut self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError>;

    /// Serialized HTML of the rendered document.
    async fn content(&mut self) -> Result<String, BrowserError>;
}

/// Launcher used when the crate is built without browser support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLauncher;

#[async_trait]
impl BrowserLauncher for UnavailableLauncher {
    async fn launch(&self, _provider: BrowserProvider, _headless: bool) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        Err(BrowserError::Unavailable)
    }
}

/// The launcher this build drives real pages with.
#[must_use]
pub fn default_launcher() -> Arc<dyn BrowserLauncher> {
    #[cfg(feature = "browser")]
    {
        Arc::new(ChromiumLauncher::default())
    }
    #[cfg(not(feature = "browser"))]
    {
        Arc::new(UnavailableLauncher)
    }
}

/// One rendered-page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserRequest {
    pub url: String,
    pub referer: Option<String>,
    /// Candidate extra headers; blank values are dropped before use.
    pub headers: Vec<(String, String)>,
    /// Request label for logs.
    pub label: Option<String>,
}

struct CachedBrowser {
    provider: BrowserProvider,
    headless: bool,
    handle: Arc<dyn BrowserHandle>,
}

/// Serialized executor over a single cached browser.
pub struct BrowserFallback {
    launcher: Arc<dyn BrowserLauncher>,
    cached: Mutex<Option<CachedBrowser>>,
    queue: Semaphore,
    settle_base: Duration,
    settle_jitter: Duration,
}

impl fmt::Debug for BrowserFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserFallback")
            .field("settle_base", &self.settle_base)
            .field("settle_jitter", &self.settle_jitter)
            .finish_non_exhaustive()
    }
}

impl Default for BrowserFallback {
    fn default() -> Self {
        Self::new(default_launcher())
    }
}

impl BrowserFallback {
    #[must_use]
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            cached: Mutex::new(None),
            queue: Semaphore::new(1),
            settle_base: SETTLE_BASE,
            settle_jitter: SETTLE_JITTER,
        }
    }

    /// Overrides the pause between navigation and content capture
    /// (`base + uniform[0, jitter)`, 250ms + up to 400ms by default).
    #[must_use]
    pub fn with_settle_delay(mut self, base: Duration, jitter: Duration) -> Self {
        self.settle_base = base;
        self.settle_jitter = jitter;
        self
    }

    /// Whether a browser is currently cached.
    pub async fn is_running(&self) -> bool {
        self.cached.lock().await.is_some()
    }

    /// Renders `request.url` and returns the page HTML (possibly empty).
    ///
    /// # Errors
    ///
    /// [`BrowserError::Disabled`] when `config.enabled` is false; launch,
    /// navigation and protocol failures otherwise. Callers on a rescue path
    /// are expected to discard the error.
    #[instrument(skip(self, config, request), fields(url = %request.url, label = request.label.as_deref()))]
    pub async fn fetch_page(
        &self,
        config: &BrowserFallbackConfig,
        request: &BrowserRequest,
    ) -> Result<String, BrowserError> {
        if !config.enabled {
            return Err(BrowserError::Disabled);
        }

        let _slot = self.queue.acquire().await.map_err(BrowserError::protocol)?;
        let browser = self.browser_for(config.provider, config.headless).await?;
        let mut context = browser.new_context(&config.user_agent).await?;

        let rendered = self.render(&mut *context, config, request).await;

        if let Err(error) = context.close().await {
            warn!(error = %error, "failed to close browser context");
        }
        if let Ok(html) = &rendered {
            debug!(bytes = html.len(), "page rendered");
        }
        rendered
    }

    async fn render(
        &self,
        context: &mut dyn BrowserContext,
        config: &BrowserFallbackConfig,
        request: &BrowserRequest,
    ) -> Result<String, BrowserError> {
        let headers = sanitize_headers(&request.headers, request.referer.as_deref());
        if !headers.is_empty() {
            context.set_extra_http_headers(&headers).await?;
        }

        let mut page = context.new_page().await?;
        let options = NavigateOptions {
            wait_until: config.wait_until,
            timeout: config.navigation_timeout(),
            referer: request.referer.clone(),
        };
        page.goto(&request.url, &options).await?;

        let settle = self.settle_base + random_below(self.settle_jitter);
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        page.content().await
    }

    async fn browser_for(&self, provider: BrowserProvider, headless: bool) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        let mut cached = self.cached.lock().await;
        if let Some(existing) = cached.as_ref() {
            if existing.provider == provider && existing.headless == headless {
                return Ok(Arc::clone(&existing.handle));
            }
        }

        if let Some(stale) = cached.take() {
            info!(
                from = %stale.provider,
                to = %provider,
                headless,
                "browser settings changed, relaunching"
            );
            if let Err(error) = stale.handle.close().await {
                warn!(error = %error, "failed to close previous browser");
            }
        }

        info!(%provider, headless, "launching browser");
        let handle = self.launcher.launch(provider, headless).await?;
        *cached = Some(CachedBrowser {
            provider,
            headless,
            handle: Arc::clone(&handle),
        });
        Ok(handle)
    }

    /// Closes the cached browser, if any. The next fetch relaunches on demand.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let stale = self.cached.lock().await.take();
        if let Some(stale) = stale {
            if let Err(error) = stale.handle.close().await {
                warn!(error = %error, "browser shutdown failed");
            }
            info!(provider = %stale.provider, "browser shut down");
        }
    }
}

/// Keeps headers with a non-blank value and sets `Referer` when given.
fn sanitize_headers(headers: &[(String, String)], referer: Option<&str>) -> BTreeMap<String, String> {
    let mut sanitized: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, value)| !name.trim().is_empty() && !value.trim().is_empty())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    if let Some(referer) = referer.filter(|r| !r.is_empty()) {
        sanitized.insert("Referer".to_string(), referer.to_string());
    }
    sanitized
}
