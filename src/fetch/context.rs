//! Fetch context factory: a cookie-persistent HTTP client with browser-like
//! default headers, a seeded User-Agent and the upstream retry policy.
//!
//! # Example
//!
//! ```no_run
//! use scrapist_core::fetch::{FetchContext, FetchOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = FetchContext::new(FetchOptions::for_base("https://example.com"))?;
//! let html = ctx.fetch_text("/ongoing", &reqwest::header::HeaderMap::new()).await?;
//! println!("{} bytes", html.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use reqwest::cookie::Jar;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, DNT, HeaderMap,
    HeaderName, HeaderValue, LOCATION, ORIGIN, PRAGMA, REFERER, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use reqwest::{Client, Method, Response, redirect};
use tracing::{debug, instrument, warn};
use url::Url;

use super::FetchError;
use super::constants::{
    DEFAULT_RESOLVE_ATTEMPTS, DEFAULT_RESOLVE_DELAY, DEFAULT_TIMEOUT, RESOLVE_DELAY_JITTER,
};
use super::diagnostics::classify;
use super::retry::{RetryDecision, RetryPolicy, random_below};
use crate::user_agent::pick_user_agent;

const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const DEFAULT_ACCEPT_LANGUAGE: &str = "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7";
const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Options for building a [`FetchContext`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Base URL that relative request paths are appended to.
    pub base_url: Option<String>,
    /// Value of the `Origin` header; also a User-Agent seed.
    pub origin: Option<String>,
    /// Value of the `Referer` header; also a User-Agent seed.
    pub referer: Option<String>,
    /// Headers laid over the defaults; these win on conflict.
    pub headers_extra: Vec<(String, String)>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Existing cookie store to share; a fresh one is created when absent.
    pub cookie_jar: Option<Arc<Jar>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            origin: None,
            referer: None,
            headers_extra: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            cookie_jar: None,
        }
    }
}

impl FetchOptions {
    /// Options for a site: base, origin and a trailing-slash referer all
    /// derived from `base`.
    #[must_use]
    pub fn for_base(base: &str) -> Self {
        let referer = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        Self {
            base_url: Some(base.to_string()),
            origin: Some(base.to_string()),
            referer: Some(referer),
            ..Self::default()
        }
    }

    /// Key under which [`FetchContextCache`] memoizes a context for these options.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        self.base_url
            .as_deref()
            .or(self.origin.as_deref())
            .or(self.referer.as_deref())
            .unwrap_or("default")
    }

    fn user_agent_seed(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .or(self.origin.as_deref())
            .or(self.referer.as_deref())
    }
}

/// A configured HTTP client bound to one cookie store.
///
/// Cloning is cheap; clones share the connection pool and the cookie store.
#[derive(Debug, Clone)]
pub struct FetchContext {
    base_url: Option<String>,
    cookie_jar: Arc<Jar>,
    client: Client,
    // reqwest fixes the redirect policy per client, so final-URL resolution
    // gets its own client over the same cookie store.
    no_redirect_client: Client,
    retry: RetryPolicy,
    user_agent: &'static str,
}

impl FetchContext {
    /// Builds a context from options.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if reqwest rejects the configuration.
    #[instrument(level = "debug", skip(options), fields(key = options.cache_key()))]
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let cookie_jar = options
            .cookie_jar
            .clone()
            .unwrap_or_else(|| Arc::new(Jar::default()));
        let user_agent = pick_user_agent(options.user_agent_seed());
        let headers = default_headers(&options, user_agent);

        let build = |policy: redirect::Policy| {
            Client::builder()
                .cookie_provider(Arc::clone(&cookie_jar))
                .default_headers(headers.clone())
                .timeout(options.timeout)
                .redirect(policy)
                .build()
                .map_err(FetchError::ClientBuild)
        };
        let client = build(redirect::Policy::default())?;
        let no_redirect_client = build(redirect::Policy::none())?;

        debug!(user_agent, "fetch context created");
        Ok(Self {
            base_url: options.base_url.map(|base| base.trim_end_matches('/').to_string()),
            cookie_jar,
            client,
            no_redirect_client,
            retry: options.retry,
            user_agent,
        })
    }

    /// The cookie store shared by every request from this context.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.cookie_jar
    }

    /// The User-Agent this context sends unless a caller overrides it.
    #[must_use]
    pub fn user_agent(&self) -> &'static str {
        self.user_agent
    }

    /// Resolves a path against the base URL. Absolute URLs pass through.
    #[must_use]
    pub fn request_url(&self, path_or_url: &str) -> String {
        if Url::parse(path_or_url).is_ok() {
            return path_or_url.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{base}/{}", path_or_url.trim_start_matches('/')),
            None => path_or_url.to_string(),
        }
    }

    /// GETs a page as text, retrying per the context's policy.
    ///
    /// `headers` are laid over the context defaults for this call only.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when no response was received and
    /// [`FetchError::Http`] (with a classified diagnostic) for a non-2xx
    /// status, once the retry budget is spent.
    #[instrument(skip(self, headers))]
    pub async fn fetch_text(&self, path_or_url: &str, headers: &HeaderMap) -> Result<String, FetchError> {
        let url = self.request_url(path_or_url);
        let response = self
            .send_with_retry(&self.client, Method::GET, &url, headers, |status| {
                (200..300).contains(&status)
            })
            .await?;
        response
            .text()
            .await
            .map_err(|source| FetchError::transport(&url, "GET", source))
    }

    /// Best-effort GET used to seed session cookies. Errors are logged and dropped.
    #[instrument(skip(self))]
    pub async fn warmup(&self, path: &str) {
        if let Err(error) = self.fetch_text(path, &HeaderMap::new()).await {
            warn!(path, error = %error, "warmup request failed");
        }
    }

    /// Issues a HEAD request without following redirects and returns where
    /// the URL points.
    ///
    /// A relative `Location` is resolved against `url`; an unresolvable one is
    /// returned verbatim. Without a `Location` the input URL is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when the request fails or answers outside
    /// 200-399.
    #[instrument(skip(self))]
    pub async fn resolve_final_url(&self, url: &str) -> Result<String, FetchError> {
        let target = self.request_url(url);
        let response = self
            .send_with_retry(&self.no_redirect_client, Method::HEAD, &target, &HeaderMap::new(), |status| {
                (200..400).contains(&status)
            })
            .await?;

        let Some(location) = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        else {
            return Ok(url.to_string());
        };

        let resolved = Url::parse(&target)
            .and_then(|base| base.join(location))
            .map_or_else(|_| location.to_string(), String::from);
        debug!(location, resolved = %resolved, "final url resolved");
        Ok(resolved)
    }

    async fn send_with_retry(
        &self,
        client: &Client,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        accept: impl Fn(u16) -> bool,
    ) -> Result<Response, FetchError> {
        let mut retries_done = 0;
        loop {
            let error = match self.send_once(client, &method, url, headers, &accept).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            match self.retry.decide(&error, &method, retries_done) {
                RetryDecision::Retry { delay, attempt } => {
                    debug!(
                        url,
                        status = error.status(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        "retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                    retries_done = attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, status = error.status(), reason = %reason, "upstream request failed");
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(
        &self,
        client: &Client,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        accept: &impl Fn(u16) -> bool,
    ) -> Result<Response, FetchError> {
        let response = client
            .request(method.clone(), url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|source| FetchError::transport(url, method.as_str(), source))?;

        let status = response.status().as_u16();
        if accept(status) {
            return Ok(response);
        }

        let response_headers = response.headers().clone();
        // An unreadable error body still leaves the status and headers to classify.
        let body = response.text().await.unwrap_or_default();
        let diagnostic = classify(status, &response_headers, &body).with_request(url, method.as_str(), None);
        debug!(
            url,
            status,
            reason = %diagnostic.reason,
            provider = %diagnostic.provider,
            "upstream rejected request"
        );
        Err(FetchError::http(diagnostic))
    }
}

fn default_headers(options: &FetchOptions, user_agent: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(DEFAULT_ACCEPT_LANGUAGE));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    for (name, value) in [(ORIGIN, &options.origin), (REFERER, &options.referer)] {
        if let Some(value) = value.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }

    for (name, value) in &options.headers_extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "ignoring invalid extra header"),
        }
    }
    headers
}

/// Attempt budget for batch final-URL resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveRetry {
    /// Total attempts per URL.
    pub attempts: u32,
    /// Pause between attempts, plus up to 200ms of random extra.
    pub delay: Duration,
}

impl Default for ResolveRetry {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RESOLVE_ATTEMPTS,
            delay: DEFAULT_RESOLVE_DELAY,
        }
    }
}

/// Contexts memoized by [`FetchOptions::cache_key`] for short-lived helpers.
#[derive(Debug, Default)]
pub struct FetchContextCache {
    contexts: DashMap<String, FetchContext>,
}

impl FetchContextCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached context for these options, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if a new context cannot be built.
    pub fn get_or_create(&self, options: FetchOptions) -> Result<FetchContext, FetchError> {
        let key = options.cache_key().to_string();
        if let Some(existing) = self.contexts.get(&key) {
            return Ok(existing.value().clone());
        }
        let context = FetchContext::new(options)?;
        Ok(self.contexts.entry(key).or_insert(context).value().clone())
    }

    /// Number of cached contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Drops every cached context.
    pub fn clear(&self) {
        self.contexts.clear();
    }

    /// Resolves one URL through the context for `reference`.
    ///
    /// # Errors
    ///
    /// See [`FetchContext::resolve_final_url`].
    pub async fn resolve_final_url(&self, url: &str, reference: &str) -> Result<String, FetchError> {
        let context = self.get_or_create(FetchOptions::for_base(reference))?;
        context.resolve_final_url(url).await
    }

    /// Resolves many URLs concurrently. Output order matches input order and a
    /// URL that still fails after `retry.attempts` tries becomes `""`.
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn resolve_final_urls(&self, urls: &[String], reference: &str, retry: ResolveRetry) -> Vec<String> {
        let tasks = urls.iter().map(|url| self.resolve_with_attempts(url, reference, retry));
        join_all(tasks).await
    }

    async fn resolve_with_attempts(&self, url: &str, reference: &str, retry: ResolveRetry) -> String {
        let attempts = retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.resolve_final_url(url, reference).await {
                Ok(resolved) => return resolved,
                Err(error) if attempt == attempts => {
                    warn!(url, attempt, error = %error, "final url resolution failed");
                }
                Err(error) => {
                    debug!(url, attempt, error = %error, "final url resolution attempt failed");
                    tokio::time::sleep(retry.delay + random_below(RESOLVE_DELAY_JITTER)).await;
                }
            }
        }
        String::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::user_agent::USER_AGENTS;

    #[test]
    fn test_for_base_derives_origin_and_referer() {
        let options = FetchOptions::for_base("https://example.com");
        assert_eq!(options.origin.as_deref(), Some("https://example.com"));
        assert_eq!(options.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(options.cache_key(), "https://example.com");
    }

    #[test]
    fn test_cache_key_fallback_order() {
        let mut options = FetchOptions {
            referer: Some("https://ref.example/".to_string()),
            ..FetchOptions::default()
        };
        assert_eq!(options.cache_key(), "https://ref.example/");
        options.origin = Some("https://origin.example".to_string());
        assert_eq!(options.cache_key(), "https://origin.example");
        assert_eq!(FetchOptions::default().cache_key(), "default");
    }

    #[test]
    fn test_default_headers_overlay_extras() {
        let options = FetchOptions {
            origin: Some("https://example.com".to_string()),
            headers_extra: vec![
                ("Accept-Language".to_string(), "en-US".to_string()),
                ("X-Custom".to_string(), "yes".to_string()),
                ("bad header".to_string(), "x".to_string()),
            ],
            ..FetchOptions::default()
        };
        let headers = default_headers(&options, USER_AGENTS[0]);
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en-US");
        assert_eq!(headers.get("x-custom").unwrap(), "yes");
        assert_eq!(headers.get(ORIGIN).unwrap(), "https://example.com");
        assert_eq!(headers.get(USER_AGENT).unwrap(), USER_AGENTS[0]);
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert!(headers.get(REFERER).is_none());
    }

    #[test]
    fn test_request_url_joins_relative_paths() {
        let ctx = FetchContext::new(FetchOptions::for_base("https://example.com/anime/")).unwrap();
        assert_eq!(ctx.request_url("/ongoing"), "https://example.com/anime/ongoing");
        assert_eq!(ctx.request_url("ongoing"), "https://example.com/anime/ongoing");
        assert_eq!(ctx.request_url("https://cdn.example.net/x"), "https://cdn.example.net/x");
    }

    #[test]
    fn test_user_agent_is_seeded_by_base() {
        let a = FetchContext::new(FetchOptions::for_base("https://example.com")).unwrap();
        let b = FetchContext::new(FetchOptions::for_base("https://example.com")).unwrap();
        assert_eq!(a.user_agent(), b.user_agent());
        assert_eq!(a.user_agent(), pick_user_agent(Some("https://example.com")));
    }

    #[test]
    fn test_cache_memoizes_by_key() {
        let cache = FetchContextCache::new();
        let first = cache.get_or_create(FetchOptions::for_base("https://a.example")).unwrap();
        let again = cache.get_or_create(FetchOptions::for_base("https://a.example")).unwrap();
        cache.get_or_create(FetchOptions::for_base("https://b.example")).unwrap();
        assert!(Arc::ptr_eq(first.cookie_jar(), again.cookie_jar()));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
