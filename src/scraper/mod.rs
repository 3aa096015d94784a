//! The scraper engine: one instance per upstream site.
//!
//! A [`Scraper`] owns a lazily built fetch context (session cookies, seeded
//! User-Agent, warmup), a lazily loaded robots.txt policy and an optional
//! request queue. Each [`scrape`](Scraper::scrape) call normalizes the path,
//! checks robots.txt, queues the request, fetches it, rescues anti-bot
//! rejections through the shared browser, and hands the document plus a fresh
//! copy of the caller's template to the caller's parser.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrapist_core::{ScrapeError, ScrapeOptions, Scraper, ScraperOptions, ScraperRuntime};
//! use scraper::Selector;
//!
//! # async fn example() -> Result<(), ScrapeError> {
//! let runtime = Arc::new(ScraperRuntime::default());
//! let site = Scraper::new("https://example.com", "/example", ScraperOptions::default(), runtime);
//!
//! let titles = site
//!     .scrape("/ongoing", &Vec::<String>::new(), ScrapeOptions::default(), |doc, mut titles| {
//!         if let Ok(selector) = Selector::parse("h2 a") {
//!             titles.extend(doc.select(&selector).map(|a| a.text().collect::<String>()));
//!         }
//!         scrapist_core::scraper::ensure_found(!titles.is_empty())?;
//!         Ok(titles)
//!     })
//!     .await?;
//! println!("{titles:?}");
//! # Ok(())
//! # }
//! ```

mod error;
mod options;
mod paths;
mod plan;
mod text;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::header::HeaderMap;
use ::scraper::Html;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

pub use error::{ScrapeError, ensure_found};
pub use options::{ScrapeOptions, ScraperOptions};
pub use paths::{
    href, join_url_path, normalize_base_url, normalize_path, resolve_request_url, same_origin,
    source_url, url_path,
};
pub use plan::{ScrapePlan, ScrapeStep, StepEvent};
pub use text::{
    NO_IFRAME, clean_text, decode_token, encode_token, iframe_src, parse_number, slug_from_url,
    to_camel_case,
};

use crate::browser::{BrowserError, BrowserFallbackConfig, BrowserRequest};
use crate::fetch::{FetchContext, FetchError, FetchOptions};
use crate::rate_limiter::{RateLimitConfig, RequestQueue, jitter_delay};
use crate::robots::{self, RobotsDecision, RobotsPolicy};
use crate::runtime::ScraperRuntime;

/// Scraper engine for one upstream site.
#[derive(Debug)]
pub struct Scraper {
    base_url: String,
    base_path: String,
    referer: String,
    label: Option<String>,
    headers_extra: Vec<(String, String)>,
    fetch_options: FetchOptions,
    warmup_paths: Vec<String>,
    rate_limit: Option<RateLimitConfig>,
    browser_config: BrowserFallbackConfig,
    runtime: Arc<ScraperRuntime>,
    context: OnceCell<FetchContext>,
    robots: OnceCell<Option<RobotsPolicy>>,
    queue: OnceLock<Option<RequestQueue>>,
    warmup_completed: AtomicBool,
}

impl Scraper {
    /// Creates a scraper. Nothing touches the network until the first call.
    #[must_use]
    pub fn new(base_url: &str, base_path: &str, options: ScraperOptions, runtime: Arc<ScraperRuntime>) -> Self {
        let base_url = normalize_base_url(base_url);
        let settings = runtime.settings();

        let origin = options.origin.clone().unwrap_or_else(|| base_url.clone());
        let referer = options.referer.clone().unwrap_or_else(|| format!("{base_url}/"));
        let rate_limit = options.rate_limit.clone().map(|mut rate_limit| {
            rate_limit.jitter_ms.get_or_insert(settings.default_jitter_ms);
            rate_limit
        });
        let browser_config = options.browser_fallback.apply(&settings.browser_fallback);

        let mut fetch_options = FetchOptions {
            base_url: Some(base_url.clone()),
            origin: Some(origin),
            referer: Some(referer.clone()),
            headers_extra: options.headers_extra.clone(),
            ..FetchOptions::default()
        };
        if let Some(timeout) = options.timeout {
            fetch_options.timeout = timeout;
        }
        if let Some(retry) = options.retry.clone() {
            fetch_options.retry = retry;
        }

        Self {
            base_path: normalize_path(base_path),
            referer,
            label: options.label.clone(),
            headers_extra: options.headers_extra.clone(),
            warmup_paths: options.resolved_warmup_paths(),
            fetch_options,
            rate_limit,
            browser_config,
            runtime,
            base_url,
            context: OnceCell::new(),
            robots: OnceCell::new(),
            queue: OnceLock::new(),
            warmup_completed: AtomicBool::new(false),
        }
    }

    /// Base URL without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Normalized API-side base path.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The effective browser settings for this scraper.
    #[must_use]
    pub fn browser_config(&self) -> &BrowserFallbackConfig {
        &self.browser_config
    }

    /// Whether warmup paths have been visited.
    #[must_use]
    pub fn warmup_completed(&self) -> bool {
        self.warmup_completed.load(Ordering::Acquire)
    }

    /// API-side link under this scraper's base path, when links are enabled.
    #[must_use]
    pub fn href<S: AsRef<str>>(&self, segments: &[S]) -> Option<String> {
        self.runtime
            .settings()
            .include_href
            .then(|| href(&self.base_path, segments))
    }

    /// Upstream URL for an in-site link, when source URLs are enabled.
    #[must_use]
    pub fn source_url(&self, url_or_path: Option<&str>) -> Option<String> {
        self.runtime
            .settings()
            .include_source_url
            .then(|| source_url(&self.base_url, url_or_path))
    }

    /// Fetches `path` and parses it with `parse`.
    ///
    /// `parse` receives the parsed document and a clone of `initial`, so
    /// calls sharing one template never observe each other's results.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::RobotsDenied`] before any request when robots.txt forbids the path
    /// - [`ScrapeError::Fetch`] when HTTP failed and no rescue applied or succeeded
    /// - [`ScrapeError::BrowserUnavailable`] when the browser-first path cannot launch
    /// - [`ScrapeError::EmptyUpstreamBody`] when the page came back empty
    /// - anything `parse` returns
    #[instrument(skip(self, initial, parse), fields(base = %self.base_url))]
    pub async fn scrape<T, F>(&self, path: &str, initial: &T, options: ScrapeOptions, parse: F) -> Result<T, ScrapeError>
    where
        T: Clone,
        F: FnOnce(&Html, T) -> Result<T, ScrapeError>,
    {
        let html = self.fetch_html(path, &options).await?;
        let document = Html::parse_document(&html);
        parse(&document, initial.clone())
    }

    /// Fetches `path` and returns the raw, non-empty HTML.
    ///
    /// # Errors
    ///
    /// Same as [`scrape`](Self::scrape), minus parser errors.
    #[instrument(skip(self, options), fields(base = %self.base_url))]
    pub async fn fetch_html(&self, path: &str, options: &ScrapeOptions) -> Result<String, ScrapeError> {
        let path = if path.starts_with("http") {
            path.to_string()
        } else {
            normalize_path(path)
        };
        let target = resolve_request_url(&self.base_url, &path);
        let label = options
            .request_label
            .clone()
            .unwrap_or_else(|| self.request_label(&path));

        let fallback_allowed = self.browser_config.enabled && options.allow_browser_fallback;
        let mut plan = ScrapePlan::new(fallback_allowed, options.prefer_browser);
        let mut html: Option<String> = None;
        let mut failure: Option<ScrapeError> = None;

        let mut step = plan.begin();
        while !step.is_terminal() {
            step = match step {
                ScrapeStep::TryBrowserFirst => match self.render(&target, &label).await {
                    Ok(rendered) if !rendered.is_empty() => {
                        html = Some(rendered);
                        plan.advance(StepEvent::BrowserRendered)
                    }
                    Ok(_) => plan.advance(StepEvent::BrowserEmpty),
                    Err(error) if error.is_launch_failure() => {
                        failure = Some(ScrapeError::BrowserUnavailable(error));
                        plan.advance(StepEvent::BrowserLaunchFailed)
                    }
                    Err(error) => {
                        debug!(url = %target, error = %error, "browser-first fetch failed, using HTTP");
                        plan.advance(StepEvent::BrowserEmpty)
                    }
                },
                ScrapeStep::TryHttp => match self.fetch_http(&path, &target, &label, options.skip_robots_check).await {
                    Ok(body) => {
                        html = Some(body);
                        plan.advance(StepEvent::HttpSucceeded)
                    }
                    Err(error) => {
                        let reason = error.diagnostic().map(|diagnostic| diagnostic.reason);
                        failure = Some(error);
                        plan.advance(StepEvent::HttpFailed(reason))
                    }
                },
                ScrapeStep::TryFallback => {
                    info!(url = %target, label = %label, "attempting browser rescue");
                    match self.render(&target, &label).await {
                        Ok(rendered) if !rendered.is_empty() => {
                            html = Some(rendered);
                            plan.advance(StepEvent::BrowserRendered)
                        }
                        Ok(_) => plan.advance(StepEvent::BrowserEmpty),
                        Err(error) => {
                            // Rescue errors are dropped; the HTTP failure is what the caller sees.
                            debug!(url = %target, error = %error, "browser rescue failed");
                            plan.advance(StepEvent::BrowserEmpty)
                        }
                    }
                }
                ScrapeStep::Start | ScrapeStep::Done | ScrapeStep::Failed => plan.begin(),
            };
        }

        match (step, html) {
            (ScrapeStep::Done, Some(html)) if !html.is_empty() => Ok(html),
            (ScrapeStep::Done, _) => Err(ScrapeError::EmptyUpstreamBody { url: target }),
            (_, _) => Err(failure.unwrap_or(ScrapeError::EmptyUpstreamBody { url: target })),
        }
    }

    fn request_label(&self, path: &str) -> String {
        match &self.label {
            Some(label) => format!("{label}:{path}"),
            None => path.to_string(),
        }
    }

    fn jitter(&self) -> Duration {
        self.rate_limit
            .as_ref()
            .map_or(Duration::ZERO, RateLimitConfig::jitter)
    }

    fn queue(&self) -> Option<&RequestQueue> {
        self.queue
            .get_or_init(|| self.rate_limit.as_ref().map(RequestQueue::new))
            .as_ref()
    }

    async fn context(&self) -> Result<&FetchContext, FetchError> {
        self.context
            .get_or_try_init(|| async {
                let context = FetchContext::new(self.fetch_options.clone())?;
                if !self.warmup_completed() && !self.warmup_paths.is_empty() {
                    for path in &self.warmup_paths {
                        context.warmup(path).await;
                        jitter_delay(self.jitter()).await;
                    }
                    self.warmup_completed.store(true, Ordering::Release);
                    debug!(paths = self.warmup_paths.len(), "warmup completed");
                }
                Ok(context)
            })
            .await
    }

    async fn fetch_http(&self, path: &str, target: &str, label: &str, skip_robots: bool) -> Result<String, ScrapeError> {
        let context = self.context().await?;
        if !skip_robots {
            self.enforce_robots(context, target).await?;
        }

        let headers = HeaderMap::new();
        let result = match self.queue() {
            Some(queue) => queue.run(|| context.fetch_text(path, &headers)).await,
            None => {
                jitter_delay(self.jitter()).await;
                context.fetch_text(path, &headers).await
            }
        };
        result.map_err(|error| ScrapeError::Fetch(error.with_request(target, "GET", Some(label.to_string()))))
    }

    async fn enforce_robots(&self, context: &FetchContext, target: &str) -> Result<(), ScrapeError> {
        if !self.runtime.settings().respect_robots_txt {
            return Ok(());
        }
        let Some(policy) = self.robots.get_or_init(|| robots::load_policy(context)).await else {
            return Ok(());
        };
        if !same_origin(&self.base_url, target) {
            debug!(url = target, "cross-origin target, robots.txt not applied");
            return Ok(());
        }
        let path = url_path(target);
        match policy.check(&path) {
            RobotsDecision::Allowed => Ok(()),
            RobotsDecision::Disallowed => {
                info!(path = %path, url = target, "blocked by robots.txt");
                Err(ScrapeError::RobotsDenied {
                    path,
                    url: target.to_string(),
                })
            }
        }
    }

    async fn render(&self, target: &str, label: &str) -> Result<String, BrowserError> {
        let request = BrowserRequest {
            url: target.to_string(),
            referer: Some(self.referer.clone()),
            headers: self.headers_extra.clone(),
            label: Some(label.to_string()),
        };
        self.runtime
            .browser()
            .fetch_page(&self.browser_config, &request)
            .await
    }
}
