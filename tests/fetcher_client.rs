use std::io::Write;
use std::time::Duration;

use flate2::{Compression, write::GzEncoder};
use mailscout::config::{HttpConfig, RetryConfig};
use mailscout::fetcher::{ErrorKind, FetchTier, HostRateLimiter, HttpFetcher, TargetSession};
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

fn http_config() -> HttpConfig {
    HttpConfig {
        request_timeout: Duration::from_secs(5),
        rate_limit_interval: Duration::from_millis(1),
        ..HttpConfig::default()
    }
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_retry_after: Duration::from_secs(1),
        ..RetryConfig::default()
    }
}

fn fetcher_with(http: HttpConfig) -> (HttpFetcher, TargetSession) {
    let session = TargetSession::new(&http).unwrap();
    let limiter = HostRateLimiter::new(http.rate_limit_interval);
    (HttpFetcher::new(http, retry_config(), limiter), session)
}

fn fetcher() -> (HttpFetcher, TargetSession) {
    fetcher_with(http_config())
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{p}", server.uri())).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(body.as_bytes())
        .insert_header("Content-Type", "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(html(
            r#"<html><head><title>Test</title><script src="/app.js"></script></head><body><p>Hello World</p></body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("var m = 'info' + '@firma.de';")
                .insert_header("Content-Type", "application/javascript"),
        )
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let target = url(&mock_server, "/test");
    let result = fetcher.fetch(&target, &session).await;

    assert!(result.is_success());
    assert_eq!(result.tier, FetchTier::Http);
    assert_eq!(result.status, Some(200));
    assert_eq!(result.final_url, target);
    assert!(result.html.contains("Hello World"));
    assert_eq!(result.text, "Hello World");
    assert_eq!(result.scripts, vec!["var m = 'info' + '@firma.de';".to_string()]);
}

#[tokio::test]
async fn test_fetch_404_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notfound"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/notfound"), &session).await;

    assert!(!result.is_success());
    assert_eq!(result.error_kind(), Some(ErrorKind::HttpStatusError));
    assert_eq!(result.status, Some(404));
}

#[tokio::test]
async fn test_fetch_500_is_retried_up_to_max_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/error"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/error"), &session).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::HttpStatusError));
    assert_eq!(result.status, Some(500));
}

#[tokio::test]
async fn test_fetch_recovers_after_transient_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<p>back again</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/flaky"), &session).await;
    assert!(result.is_success());
    assert_eq!(result.text, "back again");
}

#[tokio::test]
async fn test_fetch_429_honors_retry_after_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(html("<p>ok</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/limited"), &session).await;
    assert!(result.is_success());
}

#[tokio::test]
async fn test_fetch_429_twice_gives_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/limited"), &session).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::HttpStatusError));
    assert_eq!(result.status, Some(429));
}

#[tokio::test]
async fn test_fetch_gzip_body() {
    let mock_server = MockServer::start().await;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(b"<html><body><p>Compressed kontakt@firma.de</p></body></html>")
        .unwrap();
    let compressed = encoder.finish().unwrap();

    Mock::given(method("GET"))
        .and(path("/gzip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(compressed)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .insert_header("Content-Encoding", "gzip"),
        )
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/gzip"), &session).await;
    assert!(result.is_success());
    assert_eq!(result.text, "Compressed kontakt@firma.de");
}

#[tokio::test]
async fn test_fetch_redirect() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", mock_server.uri())),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<p>New page</p>"))
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let requested = url(&mock_server, "/old");
    let result = fetcher.fetch(&requested, &session).await;

    assert!(result.is_success());
    assert_eq!(result.requested_url, requested);
    assert_eq!(result.final_url.path(), "/new");
}

#[tokio::test]
async fn test_fetch_non_html_is_unsupported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4".to_vec())
                .insert_header("Content-Type", "application/pdf"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/file.pdf"), &session).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::UnsupportedContent));
}

#[tokio::test]
async fn test_fetch_body_too_large() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(html(&"x".repeat(4096)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher_with(HttpConfig {
        max_body_bytes: 1024,
        ..http_config()
    });
    let result = fetcher.fetch(&url(&mock_server, "/huge"), &session).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::UnsupportedContent));
}

#[tokio::test]
async fn test_fetch_challenge_page_is_flagged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503).set_body_raw(
            "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    let result = fetcher.fetch(&url(&mock_server, "/"), &session).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::BotChallengeDetected));
    assert_eq!(result.status, Some(503));
    assert!(result.html.contains("Checking your browser"));
}

#[tokio::test]
async fn test_cookies_persist_within_session() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>home</p>").insert_header("Set-Cookie", "consent=yes; Path=/"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/kontakt"))
        .and(header("cookie", "consent=yes"))
        .respond_with(html("<p>welcome back</p>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher();
    assert!(fetcher.fetch(&url(&mock_server, "/"), &session).await.is_success());
    let result = fetcher.fetch(&url(&mock_server, "/kontakt"), &session).await;
    assert!(result.is_success());
    assert_eq!(result.text, "welcome back");
}

#[tokio::test]
async fn test_linked_scripts_respect_host_interval() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><script src="/a.js"></script><script src="/b.js"></script></head><body><p>Start</p></body></html>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;
    for script in ["/a.js", "/b.js"] {
        Mock::given(method("GET"))
            .and(path(script))
            .respond_with(ResponseTemplate::new(200).set_body_raw("var x = 1;", "application/javascript"))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let interval = Duration::from_millis(150);
    let (fetcher, session) = fetcher_with(HttpConfig {
        rate_limit_interval: interval,
        ..http_config()
    });
    let started = std::time::Instant::now();
    let result = fetcher.fetch(&url(&mock_server, "/"), &session).await;

    assert!(result.is_success());
    assert_eq!(result.scripts.len(), 2);
    // Page, then one slot per script
    assert!(started.elapsed() >= interval * 2);
}

#[tokio::test]
async fn test_oversized_linked_script_is_skipped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><script src="/big.js"></script><script src="/small.js"></script></head><body><p>Start</p></body></html>"#,
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/big.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(format!("var s = '{}';", "x".repeat(4096)), "application/javascript"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/small.js"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("var m = 'a';", "application/javascript"))
        .mount(&mock_server)
        .await;

    let (fetcher, session) = fetcher_with(HttpConfig {
        max_body_bytes: 1024,
        ..http_config()
    });
    let result = fetcher.fetch(&url(&mock_server, "/"), &session).await;

    assert!(result.is_success());
    assert_eq!(result.scripts, vec!["var m = 'a';".to_string()]);
}
