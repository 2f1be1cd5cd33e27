//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files, and answers allow/deny and crawl-delay queries.
//!
//! Fetch failures never block the crawl: a network error or any status
//! other than 200 degrades to an empty, permissive rule set.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::{AgentRules, RobotsRuleSet};

use crate::config::RobotsConfig;
use crate::fetch::{FetchRequest, HttpFetch};
use crate::url::{domain_of, parse_http_url, robots_path, robots_url};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Agent used when a caller does not name one
pub const WILDCARD_AGENT: &str = "*";

/// Fetches, caches, and evaluates robots.txt rules per domain
pub struct RobotsPolicyEngine {
    config: RobotsConfig,
    fetcher: Arc<dyn HttpFetch>,
    cache: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsPolicyEngine {
    pub fn new(config: RobotsConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            config,
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether robots.txt is consulted at all
    pub fn respects_robots(&self) -> bool {
        self.config.respect_robots_txt
    }

    fn ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.config.cache_ttl_ms as i64)
    }

    /// Returns the rules for a domain, fetching them if missing or stale
    ///
    /// # Arguments
    ///
    /// * `domain` - Host (with non-default port) whose robots.txt to use
    pub async fn get_rules(&self, domain: &str) -> Arc<RobotsRuleSet> {
        self.rules_over(&self.config.scheme, domain).await
    }

    /// Like [`get_rules`](Self::get_rules), fetching robots.txt over `scheme` on a miss
    async fn rules_over(&self, scheme: &str, domain: &str) -> Arc<RobotsRuleSet> {
        if let Some(rules) = self.cached_rules(domain) {
            return rules;
        }

        let rules = Arc::new(self.fetch_rules(scheme, domain).await);
        self.cache.lock().insert(
            domain.to_string(),
            CachedRobots {
                rules: Arc::clone(&rules),
                fetched_at: chrono::Utc::now(),
            },
        );
        rules
    }

    fn cached_rules(&self, domain: &str) -> Option<Arc<RobotsRuleSet>> {
        let cache = self.cache.lock();
        let cached = cache.get(domain)?;
        if cached.is_stale(self.ttl()) {
            tracing::debug!("robots.txt for {} is stale, re-fetching", domain);
            return None;
        }
        Some(Arc::clone(&cached.rules))
    }

    async fn fetch_rules(&self, scheme: &str, domain: &str) -> RobotsRuleSet {
        let url = robots_url(scheme, domain);
        let mut request = FetchRequest::new(url.clone());
        request.timeout = ROBOTS_FETCH_TIMEOUT;

        match self.fetcher.fetch(&request).await {
            Ok(response) if response.status == 200 => {
                tracing::info!("Fetched robots.txt for {}", domain);
                RobotsRuleSet::parse(&response.body)
            }
            Ok(response) if response.status == 404 => {
                tracing::debug!("No robots.txt for {}, allowing all", domain);
                RobotsRuleSet::allow_all()
            }
            Ok(response) => {
                tracing::warn!(
                    "robots.txt for {} returned HTTP {}, allowing all",
                    domain,
                    response.status
                );
                RobotsRuleSet::allow_all()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}, allowing all", url, e);
                RobotsRuleSet::allow_all()
            }
        }
    }

    /// Checks if a URL is allowed by robots.txt
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `agent` - The user agent to resolve the rule block for; `*` if `None`
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Allowed, or robots.txt is not respected
    /// * `Ok(false)` - Disallowed
    /// * `Err(CrawlError)` - The URL could not be parsed
    pub async fn is_allowed(&self, url: &str, agent: Option<&str>) -> Result<bool> {
        if !self.respects_robots() {
            return Ok(true);
        }

        let parsed = parse_http_url(url)?;
        let domain = domain_of(url)?;
        let rules = self.rules_over(parsed.scheme(), &domain).await;

        let allowed = rules.is_allowed(&robots_path(&parsed), agent.unwrap_or(WILDCARD_AGENT));
        if !allowed {
            tracing::debug!("robots.txt disallows {}", url);
        }
        Ok(allowed)
    }

    /// Gets the crawl delay a domain declares for the given agent
    pub async fn crawl_delay(&self, domain: &str, agent: Option<&str>) -> Option<Duration> {
        if !self.respects_robots() {
            return None;
        }

        self.get_rules(domain)
            .await
            .crawl_delay(agent.unwrap_or(WILDCARD_AGENT))
    }

    /// Installs rules for a domain without fetching, e.g. from an external store
    pub fn insert_rules(&self, domain: &str, rules: RobotsRuleSet) {
        self.cache
            .lock()
            .insert(domain.to_string(), CachedRobots::new(rules));
    }

    /// Drops the cached rules for a domain
    pub fn invalidate(&self, domain: &str) {
        self.cache.lock().remove(domain);
    }

    /// Domains with cached rules (fresh or stale)
    pub fn cached_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.cache.lock().keys().cloned().collect();
        domains.sort();
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use crate::CrawlError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves a fixed robots.txt response and counts fetches
    struct StubFetcher {
        status: u16,
        body: String,
        fail: bool,
        calls: AtomicUsize,
        requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn serving(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                fail: false,
                calls: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                status: 0,
                body: String::new(),
                fail: true,
                calls: AtomicUsize::new(0),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpFetch for StubFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(request.url.clone());
            if self.fail {
                return Err(CrawlError::Network {
                    url: request.url.clone(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(FetchResponse {
                url: request.url.clone(),
                status: self.status,
                headers: BTreeMap::new(),
                body: self.body.clone(),
            })
        }
    }

    fn engine(fetcher: Arc<StubFetcher>) -> RobotsPolicyEngine {
        RobotsPolicyEngine::new(RobotsConfig::default(), fetcher)
    }

    #[tokio::test]
    async fn test_disallow_and_allow() {
        let fetcher = StubFetcher::serving(200, "User-agent: *\nDisallow: /admin\nAllow: /admin/public");
        let engine = engine(fetcher);

        assert!(!engine
            .is_allowed("https://example.com/admin", Some("Bot"))
            .await
            .unwrap());
        assert!(engine
            .is_allowed("https://example.com/admin/public", Some("Bot"))
            .await
            .unwrap());
        assert!(engine.is_allowed("https://example.com/", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_rules_are_cached() {
        let fetcher = StubFetcher::serving(200, "User-agent: *\nDisallow: /x");
        let engine = engine(Arc::clone(&fetcher));

        for _ in 0..3 {
            engine.is_allowed("https://example.com/x", None).await.unwrap();
        }
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(engine.cached_domains(), vec!["example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_rules_are_refetched() {
        let fetcher = StubFetcher::serving(200, "User-agent: *\nDisallow: /x");
        let engine = engine(Arc::clone(&fetcher));

        engine.get_rules("example.com").await;
        engine
            .cache
            .lock()
            .get_mut("example.com")
            .unwrap()
            .fetched_at = chrono::Utc::now() - chrono::Duration::hours(2);
        engine.get_rules("example.com").await;

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_allows_everything() {
        let engine = engine(StubFetcher::failing());
        assert!(engine.is_allowed("https://example.com/admin", None).await.unwrap());
        assert_eq!(engine.crawl_delay("example.com", None).await, None);
    }

    #[tokio::test]
    async fn test_not_found_allows_everything() {
        let engine = engine(StubFetcher::serving(404, "User-agent: *\nDisallow: /"));
        assert!(engine.is_allowed("https://example.com/", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_allows_everything() {
        let engine = engine(StubFetcher::serving(503, "User-agent: *\nDisallow: /"));
        assert!(engine.is_allowed("https://example.com/", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_respect_flag_off_never_fetches() {
        let fetcher = StubFetcher::serving(200, "User-agent: *\nDisallow: /");
        let config = RobotsConfig {
            respect_robots_txt: false,
            ..RobotsConfig::default()
        };
        let engine = RobotsPolicyEngine::new(config, Arc::clone(&fetcher) as Arc<dyn HttpFetch>);

        assert!(engine.is_allowed("https://example.com/", None).await.unwrap());
        assert_eq!(engine.crawl_delay("example.com", Some("Bot")).await, None);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_crawl_delay_in_milliseconds() {
        let engine = engine(StubFetcher::serving(200, "User-agent: *\nCrawl-delay: 1.5"));
        assert_eq!(
            engine.crawl_delay("example.com", Some("Bot")).await,
            Some(Duration::from_millis(1500))
        );
    }

    #[tokio::test]
    async fn test_insert_and_invalidate() {
        let fetcher = StubFetcher::serving(200, "");
        let engine = engine(Arc::clone(&fetcher));

        engine.insert_rules("example.com", RobotsRuleSet::parse("User-agent: *\nDisallow: /"));
        assert!(!engine.is_allowed("https://example.com/a", None).await.unwrap());
        assert_eq!(fetcher.calls(), 0);

        engine.invalidate("example.com");
        assert!(engine.is_allowed("https://example.com/a", None).await.unwrap());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_robots_fetched_over_the_url_scheme() {
        let fetcher = StubFetcher::serving(200, "User-agent: *\nCrawl-delay: 2");
        let engine = engine(Arc::clone(&fetcher));

        engine.is_allowed("http://example.com/page", None).await.unwrap();
        engine.crawl_delay("other.com", None).await;

        assert_eq!(
            *fetcher.requested.lock(),
            vec![
                "http://example.com/robots.txt".to_string(),
                "https://other.com/robots.txt".to_string(),
            ]
        );
        // Domain-level lookups reuse what the URL check cached
        assert_eq!(
            engine.crawl_delay("example.com", None).await,
            Some(Duration::from_secs(2))
        );
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_error() {
        let engine = engine(StubFetcher::serving(200, ""));
        assert!(engine.is_allowed("not a url", None).await.is_err());
    }
}
