//! CLI entry point for scrapist.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use scraper::Selector;
use scrapist_core::fetch::ResolveRetry;
use scrapist_core::scraper::{clean_text, normalize_base_url, normalize_path, resolve_request_url, url_path};
use scrapist_core::{
    FetchContext, FetchOptions, RateLimitConfig, ScrapeError, ScrapeOptions, Scraper, ScraperOptions, ScraperRuntime,
    ScraperSettings, robots,
};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, FetchArgs, ResolveArgs, RobotsArgs};

#[derive(Debug, Clone, Default)]
struct PageSummary {
    title: String,
    links: usize,
    bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let settings = ScraperSettings::from_env();
    let runtime = Arc::new(ScraperRuntime::new(settings));

    let outcome = match args.command {
        Command::Fetch(fetch) => run_fetch(&runtime, fetch).await,
        Command::Resolve(resolve) => run_resolve(&runtime, resolve).await,
        Command::Robots(robots) => run_robots(robots).await,
    };

    runtime.shutdown().await;
    outcome
}

async fn run_fetch(runtime: &Arc<ScraperRuntime>, args: FetchArgs) -> Result<()> {
    let mut options = ScraperOptions::default().with_warmup_paths(args.warmup);
    if let Some(label) = args.label {
        options = options.with_label(label);
    }
    if args.max_concurrent.is_some() || args.jitter_ms.is_some() {
        options = options.with_rate_limit(RateLimitConfig {
            max_concurrent: args.max_concurrent.map_or(1, usize::from),
            jitter_ms: args.jitter_ms,
            ..RateLimitConfig::default()
        });
    }

    let scraper = Scraper::new(&args.base_url, "/", options, Arc::clone(runtime));
    let call = ScrapeOptions {
        allow_browser_fallback: !args.no_fallback,
        prefer_browser: args.prefer_browser,
        skip_robots_check: args.no_robots,
        request_label: None,
    };

    if args.raw {
        let html = scraper.fetch_html(&args.path, &call).await.map_err(report)?;
        println!("{html}");
        return Ok(());
    }

    let summary = scraper
        .scrape(&args.path, &PageSummary::default(), call, |document, mut summary| {
            if let Ok(title) = Selector::parse("title") {
                let text = document.select(&title).next().map(|node| node.text().collect::<String>());
                summary.title = clean_text(text.as_deref());
            }
            if let Ok(anchors) = Selector::parse("a[href]") {
                summary.links = document.select(&anchors).count();
            }
            summary.bytes = document.html().len();
            Ok(summary)
        })
        .await
        .map_err(report)?;

    info!(warmed_up = scraper.warmup_completed(), "fetch complete");
    println!("title: {}", summary.title);
    println!("links: {}", summary.links);
    println!("bytes: {}", summary.bytes);
    Ok(())
}

async fn run_resolve(runtime: &ScraperRuntime, args: ResolveArgs) -> Result<()> {
    let retry = ResolveRetry {
        attempts: args.attempts,
        ..ResolveRetry::default()
    };
    let resolved = runtime
        .resolve_final_urls(&args.urls, &normalize_base_url(&args.reference), retry)
        .await;

    let mut failures = 0usize;
    for (url, target) in args.urls.iter().zip(&resolved) {
        if target.is_empty() {
            failures += 1;
            warn!(url = %url, "could not resolve");
        }
        println!("{url}\t{target}");
    }
    if failures == args.urls.len() {
        bail!("no URL could be resolved");
    }
    Ok(())
}

async fn run_robots(args: RobotsArgs) -> Result<()> {
    let base = normalize_base_url(&args.base_url);
    let context = FetchContext::new(FetchOptions::for_base(&base)).context("building HTTP client")?;
    let path = url_path(&resolve_request_url(&base, &normalize_path(&args.path)));

    match robots::load_policy(&context).await {
        Some(policy) => {
            let decision = policy.check(&path);
            println!("{path}\t{}", if decision.is_allowed() { "allowed" } else { "disallowed" });
        }
        None => println!("{path}\tallowed (no robots.txt)"),
    }
    Ok(())
}

fn report(error: ScrapeError) -> anyhow::Error {
    if let Some(diagnostic) = error.diagnostic() {
        warn!(
            status = diagnostic.status,
            reason = %diagnostic.reason,
            provider = ?diagnostic.provider,
            "upstream rejected the request"
        );
    }
    let status = error.status_code();
    anyhow::Error::new(error).context(format!("scrape failed (status {status})"))
}
