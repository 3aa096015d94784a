//! Integration tests for fetch contexts and final-URL resolution.

use std::time::Duration;

use reqwest::header::HeaderMap;
use scrapist_core::fetch::{FailureReason, FetchContextCache, ResolveRetry, UpstreamProvider};
use scrapist_core::user_agent::pick_user_agent;
use scrapist_core::{FetchContext, FetchError, FetchOptions, RetryPolicy, robots};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::ZERO)
}

fn context_for(server: &MockServer) -> FetchContext {
    let options = FetchOptions {
        retry: fast_retry(),
        ..FetchOptions::for_base(&server.uri())
    };
    FetchContext::new(options).unwrap()
}

#[tokio::test]
async fn test_retryable_status_exhausts_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let error = context_for(&server)
        .fetch_text("/busy", &HeaderMap::new())
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(503));
    assert_eq!(error.diagnostic().unwrap().reason, FailureReason::Maintenance);
}

#[tokio::test]
async fn test_non_retryable_status_is_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let error = context_for(&server)
        .fetch_text("/bad", &HeaderMap::new())
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(400));
    assert_eq!(error.diagnostic().unwrap().reason, FailureReason::Unknown);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let body = context_for(&server)
        .fetch_text("/flaky", &HeaderMap::new())
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_rate_limited_with_cloudflare_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("cf-ray", "8a1b2c3d4e5f-SIN"))
        .mount(&server)
        .await;

    let error = context_for(&server)
        .fetch_text("/limited", &HeaderMap::new())
        .await
        .unwrap_err();

    let diagnostic = error.diagnostic().unwrap();
    assert_eq!(diagnostic.reason, FailureReason::RateLimited);
    assert_eq!(diagnostic.provider, UpstreamProvider::Cloudflare);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let context = FetchContext::new(FetchOptions {
        retry: RetryPolicy::none(),
        ..FetchOptions::for_base(&uri)
    })
    .unwrap();
    let error = context.fetch_text("/", &HeaderMap::new()).await.unwrap_err();

    assert!(matches!(error, FetchError::Transport { .. }));
    assert!(error.diagnostic().is_none());
}

#[tokio::test]
async fn test_seeded_user_agent_and_session_headers_are_sent() {
    let server = MockServer::start().await;
    let base = server.uri();
    let expected_ua = pick_user_agent(Some(&base));

    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", expected_ua))
        .and(header("origin", base.as_str()))
        .and(header("referer", format!("{base}/").as_str()))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let mut options = FetchOptions::for_base(&base);
    options.headers_extra = vec![
        ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
        ("X-Empty".to_string(), String::new()),
    ];
    let context = FetchContext::new(options).unwrap();

    assert_eq!(context.user_agent(), expected_ua);
    assert_eq!(context.fetch_text("/page", &HeaderMap::new()).await.unwrap(), "hello");
}

#[tokio::test]
async fn test_cookies_persist_across_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "token=xyz; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("cookie", "token=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    let context = context_for(&server);
    context.warmup("/login").await;
    assert_eq!(context.fetch_text("/private", &HeaderMap::new()).await.unwrap(), "welcome");
}

#[tokio::test]
async fn test_robots_policy_loaded_with_text_accept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .and(header("accept", "text/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
        .expect(1)
        .mount(&server)
        .await;

    let policy = robots::load_policy(&context_for(&server)).await.unwrap();
    assert!(!policy.is_allowed("/admin/users"));
    assert!(policy.is_allowed("/anime"));
}

#[tokio::test]
async fn test_robots_unavailable_yields_no_policy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(robots::load_policy(&context_for(&server)).await.is_none());
}

#[tokio::test]
async fn test_resolve_final_url_follows_location_once() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/go/1"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/watch/1"))
        .expect(1)
        .mount(&server)
        .await;

    let context = context_for(&server);
    let resolved = context
        .resolve_final_url(&format!("{}/go/1", server.uri()))
        .await
        .unwrap();
    assert_eq!(resolved, format!("{}/watch/1", server.uri()));
}

#[tokio::test]
async fn test_resolve_final_url_without_location_returns_input() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/direct"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("{}/direct", server.uri());
    assert_eq!(context_for(&server).resolve_final_url(&url).await.unwrap(), url);
}

#[tokio::test]
async fn test_resolve_final_urls_preserves_order_and_blanks_failures() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "https://mirror.example/a"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "https://mirror.example/b"))
        .mount(&server)
        .await;

    let cache = FetchContextCache::new();
    let urls = vec![
        format!("{}/a", server.uri()),
        format!("{}/missing", server.uri()),
        format!("{}/b", server.uri()),
    ];
    let retry = ResolveRetry {
        attempts: 2,
        delay: Duration::from_millis(1),
    };

    let resolved = cache.resolve_final_urls(&urls, &server.uri(), retry).await;

    assert_eq!(
        resolved,
        ["https://mirror.example/a", "", "https://mirror.example/b"]
    );
    assert_eq!(cache.len(), 1);
}
