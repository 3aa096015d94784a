//! Classification of rejected upstream exchanges.
//!
//! When an upstream answers with a non-success status, [`classify`] inspects the
//! status, a handful of well-known headers and the start of the body to decide
//! *why* the request was rejected and which anti-bot provider (if any) sits in
//! front of the site.
//!
//! A diagnostic only exists when a status was received. Pure transport failures
//! (DNS, refused connections, timeouts) never get one.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::header::HeaderMap;
use serde::Serialize;

/// Maximum size of the stored body snippet, in bytes.
pub const BODY_SNIPPET_LIMIT: usize = 320;

/// Headers copied into [`UpstreamDiagnostic::headers`] when present.
const SAMPLED_HEADERS: &[&str] = &[
    "server",
    "content-type",
    "cf-ray",
    "cf-mitigated",
    "cf-cache-status",
    "x-served-by",
    "x-cache",
    "akamai-grn",
    "x-akamai-transformed",
    "x-amzn-waf-action",
    "retry-after",
    "x-ratelimit-remaining",
    "ratelimit-remaining",
    "x-rate-limit-remaining",
];

/// Headers that make up the dedup fingerprint, after the status.
const FINGERPRINT_HEADERS: &[&str] = &["server", "cf-ray", "cf-mitigated", "x-served-by", "akamai-grn"];

const RATE_LIMIT_REMAINING_HEADERS: &[&str] = &[
    "x-ratelimit-remaining",
    "ratelimit-remaining",
    "x-rate-limit-remaining",
];

const CHALLENGE_MARKERS: &[&str] = &[
    "cf-chl",
    "cf_chl_opt",
    "challenge-platform",
    "just a moment",
    "checking your browser",
    "enable javascript and cookies",
    "turnstile",
    "captcha",
];

const BLOCK_MARKERS: &[&str] = &[
    "access denied",
    "you have been blocked",
    "request blocked",
    "attention required",
    "error 1020",
    "bot detected",
    "forbidden",
];

const GEO_MARKERS: &[&str] = &[
    "not available in your country",
    "not available in your region",
    "error 1009",
    "not available in your location",
    "geo-restricted",
    "geo restricted",
    "geoblocked",
    "geo-blocked",
];

/// Closed set of reasons an upstream request can be rejected for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// HTTP 429 or an exhausted rate-limit header.
    RateLimited,
    /// HTTP 401.
    Unauthorized,
    /// 5xx: upstream down, overloaded or in maintenance.
    Maintenance,
    /// 403 carrying an interactive/JS challenge.
    BrowserChallenge,
    /// 403 that looks like a WAF/bot block.
    BotBlock,
    /// 403 restricted by visitor location.
    GeoBlock,
    /// Anything else.
    #[default]
    Unknown,
}

impl FailureReason {
    /// Wire name used in logs and by the error boundary.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::Maintenance => "maintenance",
            Self::BrowserChallenge => "browser_challenge",
            Self::BotBlock => "bot_block",
            Self::GeoBlock => "geo_block",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a headless browser has a chance of getting past this rejection.
    #[must_use]
    pub fn is_browser_rescuable(self) -> bool {
        matches!(self, Self::BrowserChallenge | Self::BotBlock | Self::GeoBlock)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort guess of the anti-bot / CDN provider in front of the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamProvider {
    Cloudflare,
    Akamai,
    Fastly,
    #[default]
    Unknown,
}

impl UpstreamProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::Akamai => "akamai",
            Self::Fastly => "fastly",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UpstreamProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a rejected upstream exchange.
///
/// Built by [`classify`]; `url`, `method` and `request_label` are filled in
/// afterwards by whoever knows the request (see [`UpstreamDiagnostic::with_request`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamDiagnostic {
    pub status: u16,
    pub reason: FailureReason,
    pub provider: UpstreamProvider,
    /// Status plus a few diagnostic headers, for dedup/telemetry only.
    pub fingerprint: String,
    /// Lowercased names of the sampled headers and their values.
    pub headers: BTreeMap<String, String>,
    /// At most [`BODY_SNIPPET_LIMIT`] bytes from the start of the body.
    pub body_snippet: String,
    pub url: Option<String>,
    pub method: Option<String>,
    pub request_label: Option<String>,
}

/// The part of a diagnostic the error boundary needs to render a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticSummary<'a> {
    pub reason: FailureReason,
    pub provider: UpstreamProvider,
    pub status: u16,
    pub request_label: Option<&'a str>,
}

impl UpstreamDiagnostic {
    /// Records which request produced this diagnostic.
    #[must_use]
    pub fn with_request(
        mut self,
        url: impl Into<String>,
        method: impl Into<String>,
        request_label: Option<String>,
    ) -> Self {
        self.url = Some(url.into());
        self.method = Some(method.into().to_ascii_uppercase());
        self.request_label = request_label;
        self
    }

    #[must_use]
    pub fn summary(&self) -> DiagnosticSummary<'_> {
        DiagnosticSummary {
            reason: self.reason,
            provider: self.provider,
            status: self.status,
            request_label: self.request_label.as_deref(),
        }
    }
}

/// Classifies a rejected exchange.
///
/// Priority order:
///
/// | Condition | Reason |
/// |-----------|--------|
/// | 429, or a rate-limit "remaining" header at 0 | `rate_limited` |
/// | 401 | `unauthorized` |
/// | any status >= 500 | `maintenance` |
/// | 403 with challenge marker / `cf-mitigated: challenge` | `browser_challenge` |
/// | 403 with block marker | `bot_block` |
/// | 403 with country-restriction marker | `geo_block` |
/// | other 403 | `bot_block` |
/// | anything else | `unknown` |
#[must_use]
pub fn classify(status: u16, headers: &HeaderMap, body: &str) -> UpstreamDiagnostic {
    let body_snippet = snippet(body);
    let reason = classify_reason(status, headers, &body_snippet.to_lowercase());

    UpstreamDiagnostic {
        status,
        reason,
        provider: guess_provider(headers),
        fingerprint: fingerprint(status, headers),
        headers: sample_headers(headers),
        body_snippet,
        url: None,
        method: None,
        request_label: None,
    }
}

fn classify_reason(status: u16, headers: &HeaderMap, lower_body: &str) -> FailureReason {
    if status == 429 || rate_limit_exhausted(headers) {
        return FailureReason::RateLimited;
    }
    if status == 401 {
        return FailureReason::Unauthorized;
    }
    if status >= 500 {
        return FailureReason::Maintenance;
    }
    if status == 403 {
        return classify_forbidden(headers, lower_body);
    }
    FailureReason::Unknown
}

fn classify_forbidden(headers: &HeaderMap, lower_body: &str) -> FailureReason {
    let mitigation = header_value(headers, "cf-mitigated")
        .or_else(|| header_value(headers, "x-amzn-waf-action"))
        .map(|value| value.to_ascii_lowercase());
    let challenged_by_header = mitigation
        .as_deref()
        .is_some_and(|value| value.contains("challenge") || value.contains("captcha"));

    if challenged_by_header || contains_any(lower_body, CHALLENGE_MARKERS) {
        FailureReason::BrowserChallenge
    } else if contains_any(lower_body, BLOCK_MARKERS) {
        FailureReason::BotBlock
    } else if contains_any(lower_body, GEO_MARKERS) {
        FailureReason::GeoBlock
    } else {
        FailureReason::BotBlock
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    RATE_LIMIT_REMAINING_HEADERS
        .iter()
        .filter_map(|name| header_value(headers, name))
        .any(|value| value.trim() == "0")
}

fn guess_provider(headers: &HeaderMap) -> UpstreamProvider {
    let server = header_value(headers, "server")
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    let has_prefixed = |prefix: &str| headers.keys().any(|name| name.as_str().starts_with(prefix));

    if headers.contains_key("cf-ray") || headers.contains_key("cf-mitigated") || server.contains("cloudflare")
    {
        UpstreamProvider::Cloudflare
    } else if headers.contains_key("akamai-grn") || has_prefixed("x-akamai") || server.contains("akamai") {
        UpstreamProvider::Akamai
    } else if server.contains("fastly")
        || has_prefixed("fastly-")
        || has_prefixed("x-fastly")
        || header_value(headers, "x-served-by").is_some_and(|value| value.contains("cache-"))
    {
        UpstreamProvider::Fastly
    } else {
        UpstreamProvider::Unknown
    }
}

fn fingerprint(status: u16, headers: &HeaderMap) -> String {
    let mut parts = vec![status.to_string()];
    parts.extend(
        FINGERPRINT_HEADERS
            .iter()
            .map(|name| header_value(headers, name).unwrap_or("-").to_string()),
    );
    parts.join("|")
}

fn sample_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    SAMPLED_HEADERS
        .iter()
        .filter_map(|name| header_value(headers, name).map(|value| ((*name).to_string(), value.to_string())))
        .collect()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Trims the body and cuts it to [`BODY_SNIPPET_LIMIT`] bytes on a char boundary.
fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= BODY_SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_SNIPPET_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::{HeaderName, HeaderValue};

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        map
    }

    const CF_CHALLENGE_BODY: &str = "<!DOCTYPE html><html><head><title>Just a moment...</title>\
        <script src=\"/cdn-cgi/challenge-platform/h/b/orchestrate/chl_page/v1\"></script></head></html>";

    #[test]
    fn test_429_without_body_is_rate_limited() {
        let diagnostic = classify(429, &HeaderMap::new(), "");
        assert_eq!(diagnostic.reason, FailureReason::RateLimited);
        assert_eq!(diagnostic.body_snippet, "");
    }

    #[test]
    fn test_429_is_rate_limited_regardless_of_headers() {
        let diagnostic = classify(429, &headers(&[("cf-mitigated", "challenge"), ("server", "cloudflare")]), "");
        assert_eq!(diagnostic.reason, FailureReason::RateLimited);
        assert_eq!(diagnostic.provider, UpstreamProvider::Cloudflare);
    }

    #[test]
    fn test_exhausted_rate_limit_header_wins_over_status() {
        let diagnostic = classify(503, &headers(&[("x-ratelimit-remaining", "0")]), "");
        assert_eq!(diagnostic.reason, FailureReason::RateLimited);

        let diagnostic = classify(503, &headers(&[("x-ratelimit-remaining", "12")]), "");
        assert_eq!(diagnostic.reason, FailureReason::Maintenance);
    }

    #[test]
    fn test_401_is_unauthorized() {
        assert_eq!(classify(401, &HeaderMap::new(), "").reason, FailureReason::Unauthorized);
    }

    #[test]
    fn test_server_errors_are_maintenance() {
        for status in [500, 502, 503, 504, 520, 599] {
            assert_eq!(
                classify(status, &HeaderMap::new(), "").reason,
                FailureReason::Maintenance,
                "status {status}"
            );
        }
    }

    #[test]
    fn test_403_with_cloudflare_challenge_body() {
        let diagnostic = classify(403, &headers(&[("cf-ray", "8a1b2c3d4e5f-SIN")]), CF_CHALLENGE_BODY);
        assert_eq!(diagnostic.reason, FailureReason::BrowserChallenge);
        assert_eq!(diagnostic.provider, UpstreamProvider::Cloudflare);
    }

    #[test]
    fn test_403_with_mitigation_header_is_challenge() {
        let diagnostic = classify(403, &headers(&[("cf-mitigated", "challenge")]), "");
        assert_eq!(diagnostic.reason, FailureReason::BrowserChallenge);
    }

    #[test]
    fn test_403_block_page_is_bot_block() {
        let body = "<html><title>Attention Required! | Cloudflare</title><h1>Sorry, you have been blocked</h1>";
        assert_eq!(classify(403, &HeaderMap::new(), body).reason, FailureReason::BotBlock);
    }

    #[test]
    fn test_403_incidental_geo_words_are_not_geo_block() {
        let body = "<footer>Country: Japan | Geometry class notes</footer>";
        assert_eq!(classify(403, &HeaderMap::new(), body).reason, FailureReason::BotBlock);
    }

    #[test]
    fn test_403_geo_page_is_geo_block() {
        let body = "This content is not available in your country.";
        assert_eq!(classify(403, &HeaderMap::new(), body).reason, FailureReason::GeoBlock);
    }

    #[test]
    fn test_plain_403_defaults_to_bot_block() {
        assert_eq!(classify(403, &HeaderMap::new(), "nope").reason, FailureReason::BotBlock);
    }

    #[test]
    fn test_other_statuses_are_unknown() {
        for status in [400, 404, 410, 451] {
            assert_eq!(classify(status, &HeaderMap::new(), "").reason, FailureReason::Unknown);
        }
    }

    #[test]
    fn test_provider_guesses() {
        assert_eq!(
            classify(403, &headers(&[("akamai-grn", "0.1234")]), "").provider,
            UpstreamProvider::Akamai
        );
        assert_eq!(
            classify(403, &headers(&[("server", "AkamaiGHost")]), "").provider,
            UpstreamProvider::Akamai
        );
        assert_eq!(
            classify(403, &headers(&[("x-served-by", "cache-sin-wsss1830031-SIN")]), "").provider,
            UpstreamProvider::Fastly
        );
        assert_eq!(
            classify(403, &headers(&[("server", "nginx")]), "").provider,
            UpstreamProvider::Unknown
        );
    }

    #[test]
    fn test_fingerprint_and_header_sample() {
        let diagnostic = classify(
            403,
            &headers(&[("server", "cloudflare"), ("cf-ray", "abc-SIN"), ("x-unrelated", "1")]),
            "",
        );
        assert_eq!(diagnostic.fingerprint, "403|cloudflare|abc-SIN|-|-|-");
        assert_eq!(diagnostic.headers.get("cf-ray").map(String::as_str), Some("abc-SIN"));
        assert!(!diagnostic.headers.contains_key("x-unrelated"));
    }

    #[test]
    fn test_body_snippet_is_bounded_on_char_boundary() {
        let body = "é".repeat(400);
        let diagnostic = classify(500, &HeaderMap::new(), &body);
        assert!(diagnostic.body_snippet.len() <= BODY_SNIPPET_LIMIT);
        assert!(diagnostic.body_snippet.len() >= BODY_SNIPPET_LIMIT - 1);
    }

    #[test]
    fn test_with_request_enriches_and_summarises() {
        let diagnostic = classify(403, &HeaderMap::new(), "").with_request(
            "https://example.com/anime/x",
            "get",
            Some("otakudesu:/anime/x".to_string()),
        );
        assert_eq!(diagnostic.method.as_deref(), Some("GET"));
        let summary = diagnostic.summary();
        assert_eq!(summary.status, 403);
        assert_eq!(summary.reason, FailureReason::BotBlock);
        assert_eq!(summary.request_label, Some("otakudesu:/anime/x"));
    }

    #[test]
    fn test_rescuable_reasons() {
        assert!(FailureReason::BrowserChallenge.is_browser_rescuable());
        assert!(FailureReason::BotBlock.is_browser_rescuable());
        assert!(FailureReason::GeoBlock.is_browser_rescuable());
        assert!(!FailureReason::Maintenance.is_browser_rescuable());
        assert!(!FailureReason::RateLimited.is_browser_rescuable());
        assert!(!FailureReason::Unknown.is_browser_rescuable());
        assert_eq!(FailureReason::default(), FailureReason::Unknown);
    }
}
