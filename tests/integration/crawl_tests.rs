//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive the full
//! crawl cycle through the plain-HTTP page fetcher.

use site_gleaner::config::{Config, DelayRange, Renderer};
use site_gleaner::crawler::{build_http_client, Crawler, HttpFetcher};
use site_gleaner::state::{PageState, RunState};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration rooted at the mock server
fn create_test_config(base_url: &str) -> Config {
    let mut config = Config::new(Url::parse(base_url).expect("Failed to parse base URL"));
    config.renderer = Renderer::Http;
    config.delay = DelayRange::new(0, 0);
    config.concurrency = 4;
    config.page_timeout = Duration::from_secs(5);
    config
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn crawl(config: Config) -> site_gleaner::CrawlOutcome {
    let client = build_http_client(&config.user_agent, config.page_timeout).unwrap();
    let fetcher = Arc::new(HttpFetcher::new(client.clone()));
    Crawler::new(Arc::new(config), fetcher, client)
        .run()
        .await
        .expect("crawl should start")
}

#[tokio::test]
async fn test_sample_page_image_set() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<html><head>
            <link rel="preload" as="image" href="/hero.webp">
            <link rel="stylesheet" href="/site.css">
            <style>.banner { background-image: url('/banner.png'); }</style>
        </head><body>
            <img src="/logo.png" alt="logo">
            <img src="data:image/gif;base64,R0lGODlhAQABAAAAACw=">
            <img srcset="/small.jpg 480w, /large.jpg 1080w">
            <picture><source srcset="/pic.avif 1x, /pic@2x.avif 2x"></picture>
            <div style="background: url(&quot;/bg.jpg&quot;) no-repeat"></div>
            <div class="banner"></div>
        </body></html>"#
            .to_string(),
    )
    .await;

    let mut config = create_test_config(&base_url);
    config.max_depth = 0;
    let outcome = crawl(config).await;

    let expected: Vec<String> = [
        "/banner.png",
        "/bg.jpg",
        "/hero.webp",
        "/large.jpg",
        "/logo.png",
        "/pic.avif",
        "/pic@2x.avif",
        "/small.jpg",
    ]
    .iter()
    .map(|p| format!("{}{}", base_url, p))
    .collect();

    let found: Vec<String> = outcome.images.iter().cloned().collect();
    assert_eq!(found, expected);
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.stats.pages_extracted, 1);
    assert_eq!(outcome.stats.images_found, expected.len());
    assert!(outcome.images.iter().all(|u| !u.starts_with("data:")));
}

#[tokio::test]
async fn test_depth_bound() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(&mock_server, "/", r#"<a href="/page1">1</a>"#.to_string()).await;
    mount_page(&mock_server, "/page1", r#"<a href="/page2">2</a>"#.to_string()).await;
    mount_page(&mock_server, "/page2", r#"<a href="/page3">3</a>"#.to_string()).await;

    Mock::given(method("GET"))
        .and(path("/page3"))
        .respond_with(html("<p>too deep</p>".to_string()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let outcome = crawl(create_test_config(&base_url)).await;

    assert_eq!(outcome.stats.pages_extracted, 3);
    assert_eq!(
        outcome.visited.get(&format!("{}/page2", base_url)),
        Some(&PageState::Extracted)
    );
    assert!(!outcome.visited.contains_key(&format!("{}/page3", base_url)));
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_page(
        &mock_server,
        "/",
        r#"<a href="/private/x">secret</a><a href="/public">open</a>"#.to_string(),
    )
    .await;
    mount_page(&mock_server, "/public", "<p>hello</p>".to_string()).await;

    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(html("<p>secret</p>".to_string()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let outcome = crawl(create_test_config(&base_url)).await;

    assert_eq!(outcome.stats.pages_extracted, 2);
    assert_eq!(outcome.stats.rejected_robots, 1);
    assert!(!outcome.visited.contains_key(&format!("{}/private/x", base_url)));
}

#[tokio::test]
async fn test_ignore_robots_visits_disallowed() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .expect(0)
        .mount(&mock_server)
        .await;

    mount_page(&mock_server, "/", r#"<a href="/private/x">secret</a>"#.to_string()).await;

    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(html(r#"<img src="/secret.png">"#.to_string()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&base_url);
    config.ignore_robots = true;
    let outcome = crawl(config).await;

    assert_eq!(outcome.stats.pages_extracted, 2);
    assert_eq!(outcome.stats.rejected_robots, 0);
    assert!(outcome.images.contains(&format!("{}/secret.png", base_url)));
}

#[tokio::test]
async fn test_no_duplicate_visits() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Every page links to every other page, plus variants of the same URLs
    let links = r##"
        <a href="/">home</a>
        <a href="/a">a</a>
        <a href="/a#section">a again</a>
        <a href="/b?utm_source=mail">b</a>
        <a href="/b">b again</a>
        <a href="#top">skip</a>
        <a href="javascript:void(0)">skip</a>
    "##;

    for route in ["/", "/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html(links.to_string()))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let mut config = create_test_config(&base_url);
    config.concurrency = 3;
    let outcome = crawl(config).await;

    assert_eq!(outcome.stats.pages_visited, 3);
    assert_eq!(outcome.stats.pages_extracted, 3);
    assert_eq!(outcome.visited.len(), 3);
}

#[tokio::test]
async fn test_failed_pages_do_not_stop_crawl() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<a href="/missing">gone</a><a href="/ok">ok</a>"#.to_string(),
    )
    .await;
    mount_page(&mock_server, "/ok", r#"<img src="/ok.png">"#.to_string()).await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let outcome = crawl(create_test_config(&base_url)).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.stats.pages_failed, 1);
    assert_eq!(outcome.stats.pages_extracted, 2);
    assert_eq!(
        outcome.visited.get(&format!("{}/missing", base_url)),
        Some(&PageState::FetchFailed)
    );
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.images.contains(&format!("{}/ok.png", base_url)));
}

#[tokio::test]
async fn test_full_run_downloads_images() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<img src="/img/logo.png"><img src="/img/missing.png">"#.to_string(),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .mount(&mock_server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&base_url);
    config.out_dir = out.path().to_path_buf();

    let report = site_gleaner::run(config).await.expect("run should succeed");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.crawl.pages_visited, 1);
    assert_eq!(report.crawl.images_found, 2);
    assert_eq!(report.downloads.downloaded, 1);
    assert_eq!(report.downloads.failed, 1);
    assert_eq!(report.downloads.bytes, 64);

    let saved = std::fs::read(out.path().join("img/logo.png")).unwrap();
    assert_eq!(saved.len(), 64);
    assert!(!out.path().join("img/missing.png").exists());
}
