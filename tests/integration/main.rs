//! Integration tests
//!
//! These tests use wiremock to stand up mock HTTP servers and drive the
//! reqwest transport, robots.txt handling and the full crawler pipeline.

mod config_tests;
mod crawl_tests;
mod fetch_tests;
mod robots_tests;

use crawl_pilot::config::{Config, LimiterConfig, RobotsConfig, StrategyConfig};
use wiremock::MockServer;

/// Host and port of a mock server, as the crawler keys its domains
pub fn server_domain(server: &MockServer) -> String {
    let url = url::Url::parse(&server.uri()).expect("Failed to parse base URL");
    format!(
        "{}:{}",
        url.host_str().expect("Failed to extract host"),
        url.port().expect("Mock server has no port")
    )
}

/// Creates a test configuration with short delays and plain-http robots
pub fn create_test_config() -> Config {
    Config {
        limiter: LimiterConfig {
            default_delay_ms: 10,
            initial_backoff_ms: 50,
            max_backoff_ms: 500,
            default_retry_after_ms: 100,
            jitter_factor: 0.0,
            ..LimiterConfig::default()
        },
        robots: RobotsConfig {
            scheme: "http".to_string(),
            ..RobotsConfig::default()
        },
        strategy: StrategyConfig {
            retries: 2,
            initial_backoff_ms: 20,
            max_backoff_ms: 100,
            ..StrategyConfig::default()
        },
        ..Config::default()
    }
}
