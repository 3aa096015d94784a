//! robots.txt parsing and evaluation for polite scraping.
//!
//! Only the `User-agent: *` block is honoured. `Allow` and `Disallow` values
//! support `*` wildcards and match as path prefixes; the longest matching rule
//! wins and ties go to `Allow`.

use regex::Regex;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::{debug, instrument, warn};

use crate::fetch::FetchContext;

/// Result of checking a path against robots.txt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsDecision {
    /// Path is allowed.
    Allowed,
    /// Path is disallowed by robots.txt.
    Disallowed,
}

impl RobotsDecision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

/// Allow/Disallow rules from the wildcard block of a robots.txt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsPolicy {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsPolicy {
    /// Parses a robots.txt body.
    ///
    /// Comments after `#` are dropped, directive names are case-insensitive and
    /// a line is split on its first `:` so values containing colons survive.
    /// Empty rule values are ignored.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut policy = Self::default();
        let mut in_star = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => in_star = value == "*",
                "disallow" if in_star && !value.is_empty() => policy.disallow.push(value.to_string()),
                "allow" if in_star && !value.is_empty() => policy.allow.push(value.to_string()),
                _ => {}
            }
        }
        policy
    }

    #[must_use]
    pub fn allow_rules(&self) -> &[String] {
        &self.allow
    }

    #[must_use]
    pub fn disallow_rules(&self) -> &[String] {
        &self.disallow
    }

    /// Evaluates a URL path (`/a/b`) against the rules.
    #[must_use]
    pub fn check(&self, path: &str) -> RobotsDecision {
        let Some(disallow) = longest_match(&self.disallow, path) else {
            return RobotsDecision::Allowed;
        };
        match longest_match(&self.allow, path) {
            Some(allow) if allow >= disallow => RobotsDecision::Allowed,
            _ => RobotsDecision::Disallowed,
        }
    }

    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        self.check(path).is_allowed()
    }
}

fn longest_match(rules: &[String], path: &str) -> Option<usize> {
    rules
        .iter()
        .filter(|rule| matches_rule(path, rule))
        .map(String::len)
        .max()
}

/// Prefix match with `*` standing for any run of characters.
fn matches_rule(path: &str, rule: &str) -> bool {
    if rule.is_empty() {
        return false;
    }
    let pattern = rule.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
    match Regex::new(&format!("^{pattern}")) {
        Ok(regex) => regex.is_match(path),
        Err(_) => path.starts_with(rule),
    }
}

/// Fetches and parses `/robots.txt` through the given context.
///
/// Any failure yields `None`, which callers treat as "everything allowed".
#[instrument(skip(context))]
pub async fn load_policy(context: &FetchContext) -> Option<RobotsPolicy> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/plain"));

    match context.fetch_text("/robots.txt", &headers).await {
        Ok(body) => {
            let policy = RobotsPolicy::parse(&body);
            debug!(
                allow = policy.allow.len(),
                disallow = policy.disallow.len(),
                "robots.txt loaded"
            );
            Some(policy)
        }
        Err(error) => {
            warn!(error = %error, "robots.txt unavailable, continuing without policy");
            None
        }
    }
}
