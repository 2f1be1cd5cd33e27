use crate::{create_test_config, server_domain};
use crawl_pilot::config::UserAgentConfig;
use crawl_pilot::fetch::{HttpFetch, ReqwestFetcher};
use crawl_pilot::RobotsPolicyEngine;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_engine() -> RobotsPolicyEngine {
    let fetcher: Arc<dyn HttpFetch> = Arc::new(
        ReqwestFetcher::new(&UserAgentConfig::default()).expect("Failed to build fetcher"),
    );
    RobotsPolicyEngine::new(create_test_config().robots, fetcher)
}

async fn mount_robots(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_allow_overrides_disallow() {
    let mock_server = MockServer::start().await;
    mount_robots(
        &mock_server,
        200,
        "User-agent: *\nDisallow: /admin\nAllow: /admin/public\n",
    )
    .await;
    let base = mock_server.uri();
    let engine = create_engine();

    assert!(!engine.is_allowed(&format!("{}/admin", base), None).await.unwrap());
    assert!(!engine
        .is_allowed(&format!("{}/admin/settings", base), None)
        .await
        .unwrap());
    assert!(engine
        .is_allowed(&format!("{}/admin/public", base), None)
        .await
        .unwrap());
    assert!(engine.is_allowed(&format!("{}/", base), None).await.unwrap());
}

#[tokio::test]
async fn test_rules_are_cached_per_domain() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, 200, "User-agent: *\nDisallow: /private\n").await;
    let engine = create_engine();

    for page in ["/a", "/b", "/private/c"] {
        engine
            .is_allowed(&format!("{}{}", mock_server.uri(), page), None)
            .await
            .unwrap();
    }

    assert_eq!(engine.cached_domains(), vec![server_domain(&mock_server)]);
    // expect(1) on the robots mock is verified when the server drops
}

#[tokio::test]
async fn test_agent_specific_group_and_crawl_delay() {
    let mock_server = MockServer::start().await;
    mount_robots(
        &mock_server,
        200,
        "User-agent: testbot\nCrawl-delay: 2\nDisallow: /slow\n\nUser-agent: *\nDisallow: /\n",
    )
    .await;
    let base = mock_server.uri();
    let engine = create_engine();

    assert!(engine
        .is_allowed(&format!("{}/page", base), Some("TestBot"))
        .await
        .unwrap());
    assert!(!engine
        .is_allowed(&format!("{}/page", base), None)
        .await
        .unwrap());
    assert_eq!(
        engine
            .crawl_delay(&server_domain(&mock_server), Some("TestBot"))
            .await,
        Some(Duration::from_secs(2))
    );
}

#[tokio::test]
async fn test_missing_robots_allows_all() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, 404, "").await;
    let engine = create_engine();

    assert!(engine
        .is_allowed(&format!("{}/anything", mock_server.uri()), None)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_server_error_allows_all() {
    let mock_server = MockServer::start().await;
    mount_robots(&mock_server, 500, "User-agent: *\nDisallow: /\n").await;
    let engine = create_engine();

    assert!(engine
        .is_allowed(&format!("{}/anything", mock_server.uri()), None)
        .await
        .unwrap());
    assert_eq!(
        engine.crawl_delay(&server_domain(&mock_server), None).await,
        None
    );
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /\n"))
        .expect(2)
        .mount(&mock_server)
        .await;
    let engine = create_engine();
    let url = format!("{}/page", mock_server.uri());

    engine.is_allowed(&url, None).await.unwrap();
    engine.invalidate(&server_domain(&mock_server));
    assert!(engine.cached_domains().is_empty());
    engine.is_allowed(&url, None).await.unwrap();
}
