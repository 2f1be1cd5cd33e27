use crawl_pilot::config::UserAgentConfig;
use crawl_pilot::fetch::{FetchRequest, HttpFetch, ReqwestFetcher};
use crawl_pilot::CrawlError;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_fetcher() -> ReqwestFetcher {
    ReqwestFetcher::new(&UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
    })
    .expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_fetch_returns_status_headers_and_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("user-agent", "TestBot/1.0.0 (+https://example.com/contact)"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hello")
                .insert_header("X-Custom", "value"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = create_fetcher();
    let response = fetcher
        .fetch(&FetchRequest::new(format!("{}/page", mock_server.uri())))
        .await
        .expect("Fetch failed");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "hello");
    assert_eq!(response.header("x-custom"), Some("value"));
}

#[tokio::test]
async fn test_request_headers_override_user_agent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "Mozilla/5.0 Test"))
        .and(header("accept-language", "en-US"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut request = FetchRequest::new(mock_server.uri());
    request
        .headers
        .insert("User-Agent".to_string(), "Mozilla/5.0 Test".to_string());
    request
        .headers
        .insert("Accept-Language".to_string(), "en-US".to_string());

    let response = create_fetcher().fetch(&request).await.expect("Fetch failed");
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_error_statuses_are_responses() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let response = create_fetcher()
        .fetch(&FetchRequest::new(format!("{}/missing", mock_server.uri())))
        .await
        .expect("Fetch failed");

    assert_eq!(response.status, 404);
    let err = response.error_for_status().unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_too_many_requests_carries_retry_after() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&mock_server)
        .await;

    let response = create_fetcher()
        .fetch(&FetchRequest::new(mock_server.uri()))
        .await
        .expect("Fetch failed");

    match response.error_for_status() {
        Err(CrawlError::RateLimited { retry_after, .. }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected rate limit, got {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn test_timeout_maps_to_network_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let mut request = FetchRequest::new(mock_server.uri());
    request.timeout = Duration::from_millis(100);

    let err = create_fetcher().fetch(&request).await.unwrap_err();
    match err {
        CrawlError::Network { message, .. } => assert!(message.contains("timeout")),
        other => panic!("expected network error, got {}", other),
    }
}
