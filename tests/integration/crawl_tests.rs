//! End-to-end tests of the crawler pipeline against mock servers

use crate::{create_test_config, server_domain};
use crawl_pilot::{CrawlError, Crawler, ErrorKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn start_server(robots: &str) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(robots))
        .mount(&mock_server)
        .await;
    mock_server
}

fn create_crawler() -> Crawler {
    Crawler::from_config(&create_test_config()).expect("Failed to build crawler")
}

#[tokio::test]
async fn test_fetch_single_page() {
    let mock_server = start_server("User-agent: *\nAllow: /\n").await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = create_crawler();
    let url = format!("{}/page", mock_server.uri());
    let response = crawler.fetch(&url, 0).await.expect("Fetch failed");

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "<html>ok</html>");

    let site = crawler.reputation().reputation(&url).expect("No reputation");
    assert_eq!(site.success_count, 1);
    assert_eq!(site.failure_count, 0);
    assert_eq!(site.domain, server_domain(&mock_server));
    assert_eq!(crawler.scheduler().running_count(), 0);
}

#[tokio::test]
async fn test_disallowed_page_is_never_requested() {
    let mock_server = start_server("User-agent: *\nDisallow: /private\n").await;
    Mock::given(method("GET"))
        .and(path("/private/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let crawler = create_crawler();
    let err = crawler
        .fetch(&format!("{}/private/data", mock_server.uri()), 0)
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::RobotsDisallowed { .. }));
    assert_eq!(crawler.scheduler().pending_count(), 0);
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let mock_server = start_server("User-agent: *\nAllow: /\n").await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = create_crawler();
    let url = format!("{}/busy", mock_server.uri());
    let response = crawler.fetch(&url, 0).await.expect("Fetch failed");
    assert_eq!(response.body, "done");

    let domain = server_domain(&mock_server);
    assert_eq!(crawler.limiter().request_count(&domain), 2);
    assert!(crawler.limiter().rate_limit_status(&domain).is_none());

    let site = crawler.reputation().reputation(&url).expect("No reputation");
    assert_eq!(site.success_count, 1);
    assert_eq!(site.failure_count, 1);
}

#[tokio::test]
async fn test_server_errors_are_retried_with_backoff() {
    let mock_server = start_server("User-agent: *\nAllow: /\n").await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = create_crawler();
    let url = format!("{}/flaky", mock_server.uri());
    let response = crawler.fetch(&url, 0).await.expect("Fetch failed");
    assert_eq!(response.status, 200);

    let site = crawler.reputation().reputation(&url).expect("No reputation");
    assert_eq!(site.failure_count, 2);
    assert_eq!(site.success_count, 1);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mock_server = start_server("User-agent: *\nAllow: /\n").await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = create_crawler();
    let err = crawler
        .fetch(&format!("{}/gone", mock_server.uri()), 0)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::HttpStatus);
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_fetch_all_reports_every_url() {
    let mock_server = start_server("User-agent: *\nDisallow: /private\n").await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("page"))
        .mount(&mock_server)
        .await;

    let base = mock_server.uri();
    let urls = vec![
        format!("{}/one", base),
        format!("{}/two", base),
        format!("{}/private/three", base),
    ];

    let crawler = create_crawler();
    let report = crawler.fetch_all(&urls, 0).await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes[2].error_kind, Some(ErrorKind::RobotsDisallowed));
    assert_eq!(report.reputations.len(), 1);
    assert_eq!(report.reputations[0].success_count, 2);
}
