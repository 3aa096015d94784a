//! CLI argument definitions using clap derive macros.

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Fetch upstream pages the way a content-scraping API would.
///
/// Scrapist keeps a cookie session per site, honours robots.txt, paces
/// requests and falls back to a headless browser for anti-bot pages.
#[derive(Parser, Debug)]
#[command(name = "scrapist")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch one page through the scraper engine and summarize it
    Fetch(FetchArgs),
    /// Follow redirects of one or more URLs without downloading them
    Resolve(ResolveArgs),
    /// Check whether a site's robots.txt permits a path
    Robots(RobotsArgs),
}

#[derive(ClapArgs, Debug)]
pub struct FetchArgs {
    /// Site base URL, e.g. https://example.com
    pub base_url: String,

    /// Path (or absolute URL) to fetch
    #[arg(default_value = "/")]
    pub path: String,

    /// Label used in logs and diagnostics
    #[arg(long)]
    pub label: Option<String>,

    /// Ignore robots.txt for this request
    #[arg(long)]
    pub no_robots: bool,

    /// Render with the browser before trying plain HTTP
    #[arg(long, conflicts_with = "no_fallback")]
    pub prefer_browser: bool,

    /// Never use the browser
    #[arg(long)]
    pub no_fallback: bool,

    /// Path visited once before the first request to collect cookies
    #[arg(long)]
    pub warmup: Vec<String>,

    /// Maximum concurrent requests to the site (1-16); enables the request queue
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub max_concurrent: Option<u8>,

    /// Upper bound of the random delay before each request, in milliseconds
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub jitter_ms: Option<u64>,

    /// Print the HTML instead of a summary
    #[arg(long)]
    pub raw: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ResolveArgs {
    /// Reference URL whose session (cookies, headers) is used
    #[arg(short, long)]
    pub reference: String,

    /// URLs to resolve
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Attempts per URL (1-10)
    #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub attempts: u32,
}

#[derive(ClapArgs, Debug)]
pub struct RobotsArgs {
    /// Site base URL
    pub base_url: String,

    /// Path to evaluate
    pub path: String,
}
