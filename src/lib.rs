//! Scrapist core library
//!
//! Resilient HTML fetching for content APIs that scrape upstream sites.
//!
//! # Architecture
//!
//! - [`scraper`] - the per-site engine: paths, robots, queueing, browser rescue, parsing
//! - [`fetch`] - session-bound HTTP contexts, retries and upstream diagnostics
//! - [`browser`] - the shared headless-browser executor
//! - [`robots`] - robots.txt parsing and evaluation
//! - [`rate_limiter`] - per-scraper concurrency, start windows and jitter
//! - [`config`] / [`runtime`] - process settings and the state shared by scrapers
//! - [`user_agent`] - desktop User-Agent pool

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod browser;
pub mod config;
pub mod fetch;
pub mod rate_limiter;
pub mod robots;
pub mod runtime;
pub mod scraper;
pub mod user_agent;

// Re-export commonly used types
pub use browser::{BrowserError, BrowserFallback, BrowserFallbackConfig, BrowserProvider, WaitUntil};
pub use config::ScraperSettings;
pub use fetch::{FailureReason, FetchContext, FetchError, FetchOptions, RetryPolicy, UpstreamDiagnostic};
pub use rate_limiter::RateLimitConfig;
pub use robots::{RobotsDecision, RobotsPolicy};
pub use runtime::ScraperRuntime;
pub use scraper::{ScrapeError, ScrapeOptions, Scraper, ScraperOptions};
