//! Crawler - request orchestration
//!
//! Composes the components for a single fetch:
//! - robots.txt gate (before any slot or proxy is used)
//! - global admission through the task scheduler
//! - per-attempt strategy from the domain's reputation
//! - per-domain pacing and rate-limit retries in the rate limiter
//! - outcome feedback into the reputation tracker
//!
//! Failures that survive the rate limiter are retried here with the
//! strategy's exponential backoff, rotating proxies when it asks for that.

mod report;

pub use report::{print_report, CrawlOutcome, CrawlReport};

use crate::config::Config;
use crate::fetch::{FetchRequest, FetchResponse, HttpFetch, ProxySource, ReqwestFetcher, StaticProxyList};
use crate::limiter::RateLimiter;
use crate::reputation::SiteReputationTracker;
use crate::robots::RobotsPolicyEngine;
use crate::scheduler::{TaskOptions, TaskScheduler};
use crate::strategy::{AdaptiveStrategyEngine, ScrapeStrategy};
use crate::url::domain_of;
use crate::{CrawlError, ErrorKind, Result};
use std::sync::Arc;

/// Main crawler structure
#[derive(Clone)]
pub struct Crawler {
    robots: Arc<RobotsPolicyEngine>,
    reputation: Arc<SiteReputationTracker>,
    strategy: Arc<AdaptiveStrategyEngine>,
    limiter: RateLimiter,
    scheduler: TaskScheduler,
    fetcher: Arc<dyn HttpFetch>,
    proxies: Option<Arc<dyn ProxySource>>,
    /// Name matched against robots.txt groups
    agent: String,
    /// Default User-Agent header
    user_agent: String,
}

impl Crawler {
    /// Creates a crawler around the given transport and proxy pool
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn HttpFetch>,
        proxies: Option<Arc<dyn ProxySource>>,
    ) -> Self {
        let robots = Arc::new(RobotsPolicyEngine::new(
            config.robots.clone(),
            Arc::clone(&fetcher),
        ));
        let reputation = Arc::new(SiteReputationTracker::from_config(&config.reputation));
        let strategy = Arc::new(AdaptiveStrategyEngine::new(
            config.strategy.clone(),
            Arc::clone(&reputation),
        ));

        Self {
            limiter: RateLimiter::with_robots(config.limiter.clone(), Arc::clone(&robots)),
            scheduler: TaskScheduler::from_config(&config.scheduler),
            robots,
            reputation,
            strategy,
            fetcher,
            proxies,
            agent: config.user_agent.crawler_name.clone(),
            user_agent: config.user_agent.header_value(),
        }
    }

    /// Creates a crawler with the reqwest transport and the configured proxies
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(&config.user_agent)?);
        let proxies: Option<Arc<dyn ProxySource>> = if config.proxies.list.is_empty() {
            None
        } else {
            Some(Arc::new(StaticProxyList::new(config.proxies.list.clone())))
        };
        Ok(Self::new(config, fetcher, proxies))
    }

    pub fn robots(&self) -> &Arc<RobotsPolicyEngine> {
        &self.robots
    }

    pub fn reputation(&self) -> &Arc<SiteReputationTracker> {
        &self.reputation
    }

    pub fn strategy(&self) -> &Arc<AdaptiveStrategyEngine> {
        &self.strategy
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The strategy the next request to `url` would use
    pub fn strategy_for(&self, url: &str) -> ScrapeStrategy {
        self.strategy.strategy_for_url(url)
    }

    /// Fetches a URL through the full pipeline
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute HTTP(S) URL
    /// * `priority` - Higher runs first, both globally and within the domain
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResponse)` - A response with a success status
    /// * `Err(CrawlError)` - Disallowed, cancelled, or failed after all retries
    pub async fn fetch(&self, url: &str, priority: i32) -> Result<FetchResponse> {
        let domain = domain_of(url)?;

        if !self.robots.is_allowed(url, Some(self.agent.as_str())).await? {
            tracing::info!("URL {} disallowed by robots.txt", url);
            let error = CrawlError::RobotsDisallowed {
                url: url.to_string(),
            };
            self.reputation.record_error(url, &error);
            return Err(error);
        }

        let options = TaskOptions {
            priority,
            domain: Some(domain),
            max_retries: self.strategy.strategy_for_url(url).retries,
            ..TaskOptions::default()
        };

        let crawler = self.clone();
        let url = url.to_string();
        self.scheduler
            .add_task_with_id(
                move |task_id| async move { crawler.fetch_with_retries(task_id, url, priority).await },
                options,
            )
            .await
    }

    /// Fetches several URLs concurrently, in input order
    pub async fn fetch_all(&self, urls: &[String], priority: i32) -> CrawlReport {
        let results =
            futures::future::join_all(urls.iter().map(|url| self.fetch(url, priority))).await;

        let outcomes = urls
            .iter()
            .zip(results)
            .map(|(url, result)| CrawlOutcome::new(url.clone(), result))
            .collect();
        CrawlReport::new(outcomes, self.reputation.snapshot())
    }

    /// Outer retry loop, run inside a scheduler slot
    async fn fetch_with_retries(
        &self,
        task_id: u64,
        url: String,
        priority: i32,
    ) -> Result<FetchResponse> {
        let mut attempt: u32 = 0;
        let mut proxy: Option<String> = None;
        let mut last_error: Option<CrawlError> = None;

        loop {
            let strategy = self.strategy.strategy_for_url(&url);
            proxy = self
                .choose_proxy(&url, &strategy, proxy, last_error.as_ref())
                .await;
            if let Some(proxy) = &proxy {
                self.strategy.record_proxy_use(&url, proxy);
            }

            let request = self.build_request(&url, &strategy, proxy.clone());
            let fetcher = Arc::clone(&self.fetcher);
            let reputation = Arc::clone(&self.reputation);
            let result = self
                .limiter
                .execute(
                    &url,
                    move || {
                        let fetcher = Arc::clone(&fetcher);
                        let reputation = Arc::clone(&reputation);
                        let request = request.clone();
                        async move {
                            let result = fetcher.fetch(&request).await.and_then(|r| r.error_for_status());
                            // Every failed attempt counts, including ones the limiter retries
                            if let Err(error) = &result {
                                reputation.record_error(&request.url, error);
                            }
                            result
                        }
                    },
                    Some(self.agent.as_str()),
                    priority,
                )
                .await;

            let error = match result {
                Ok(response) => {
                    self.reputation.record_success(&url);
                    tracing::debug!("Fetched {} (HTTP {})", url, response.status);
                    return Ok(response);
                }
                Err(error) => error,
            };

            // Attempt failures come back wrapped and were recorded as they happened
            if !matches!(error, CrawlError::Request { .. }) {
                self.reputation.record_error(&url, &error);
            }
            if let (Some(proxy), Some(pool)) = (&proxy, &self.proxies) {
                if error.kind() == ErrorKind::Network {
                    pool.report_failure(proxy).await;
                }
            }

            if !error.is_retryable() || attempt >= strategy.retries {
                tracing::warn!("Giving up on {} after {} attempts: {}", url, attempt + 1, error);
                return Err(error);
            }

            let delay = strategy.backoff_delay(attempt);
            attempt += 1;
            self.scheduler.note_retry(task_id);
            tracing::info!(
                "Retrying {} ({}/{}) in {:?}: {}",
                url,
                attempt,
                strategy.retries,
                delay,
                error
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
        }
    }

    /// Picks the proxy for the next attempt
    async fn choose_proxy(
        &self,
        url: &str,
        strategy: &ScrapeStrategy,
        current: Option<String>,
        last_error: Option<&CrawlError>,
    ) -> Option<String> {
        let pool = self.proxies.as_ref()?;

        let mut chosen = match current {
            None => pool.next().await,
            Some(current) if strategy.rotate_proxies_on_retry && last_error.is_some() => {
                let others: Vec<String> = pool
                    .candidates()
                    .into_iter()
                    .filter(|candidate| *candidate != current)
                    .collect();
                match self.strategy.select_optimal_proxy(url, &others, last_error) {
                    Some(proxy) => Some(proxy),
                    None => Some(current),
                }
            }
            Some(current) => Some(current),
        };

        if strategy.validate_proxies {
            if let Some(proxy) = chosen.clone() {
                if !pool.revalidate(&proxy).await {
                    tracing::info!("Proxy {} failed validation", proxy);
                    pool.report_failure(&proxy).await;
                    chosen = pool.next().await;
                }
            }
        }

        chosen
    }

    fn build_request(
        &self,
        url: &str,
        strategy: &ScrapeStrategy,
        proxy: Option<String>,
    ) -> FetchRequest {
        let mut request = FetchRequest::new(url);
        request.headers = strategy.headers.clone();
        request
            .headers
            .entry("User-Agent".to_string())
            .or_insert_with(|| self.user_agent.clone());
        request.timeout = strategy.timeout();
        request.proxy = proxy;
        request
    }
}
