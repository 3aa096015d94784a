//! End-to-end CLI tests for the scrapist binary.

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scrapist() -> Command {
    let mut cmd = Command::cargo_bin("scrapist").unwrap();
    cmd.env("SCRAPER_BROWSER_FALLBACK", "false").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    scrapist()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch upstream pages"));
}

#[test]
fn test_binary_version_displays_version() {
    scrapist()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scrapist"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    scrapist().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    scrapist()
        .args(["fetch", "https://example.com", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[tokio::test]
async fn test_robots_subcommand_reports_verdict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
        .mount(&server)
        .await;
    let base = server.uri();

    let assert = tokio::task::spawn_blocking(move || {
        scrapist().args(["-q", "robots", &base, "/admin/panel"]).assert()
    })
    .await
    .unwrap();

    assert.success().stdout(predicate::str::contains("/admin/panel\tdisallowed"));
}

#[tokio::test]
async fn test_robots_subcommand_checks_site_root() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;
    let base = server.uri();

    let assert = tokio::task::spawn_blocking(move || scrapist().args(["-q", "robots", &base, "/"]).assert())
        .await
        .unwrap();

    assert.success().stdout(predicate::str::contains("/\tdisallowed"));
}

#[tokio::test]
async fn test_fetch_subcommand_prints_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ongoing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title> Ongoing Anime </title></head><body><a href=\"/a\">a</a></body></html>"),
        )
        .mount(&server)
        .await;
    let base = server.uri();

    let assert = tokio::task::spawn_blocking(move || {
        scrapist()
            .args(["-q", "fetch", &base, "/ongoing", "--no-fallback"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("title: Ongoing Anime"))
        .stdout(predicate::str::contains("links: 1"));
}

#[tokio::test]
async fn test_fetch_subcommand_fails_on_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let base = server.uri();

    let assert = tokio::task::spawn_blocking(move || {
        scrapist().args(["-q", "fetch", &base, "/down", "--no-fallback"]).assert()
    })
    .await
    .unwrap();

    assert.failure().stderr(predicate::str::contains("status 404"));
}
