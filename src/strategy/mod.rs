//! Adaptive request strategy
//!
//! Turns the configured defaults plus a domain's current reputation into
//! the concrete policy for one request: retries, timeout, headers, backoff,
//! and proxy handling. Also picks a proxy for a retry based on what went
//! wrong last time.

mod network;
mod policy;

pub use network::network_class;
pub use policy::ScrapeStrategy;

use crate::config::StrategyConfig;
use crate::reputation::{ErrorPattern, SiteReputationTracker};
use crate::url::domain_of;
use crate::CrawlError;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lower bound for shrunken initial backoff (milliseconds)
const MIN_INITIAL_BACKOFF_MS: u64 = 100;

/// Browser User-Agent strings used when random agents are requested
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Computes per-request strategies from defaults and reputation
pub struct AdaptiveStrategyEngine {
    defaults: StrategyConfig,
    tracker: Arc<SiteReputationTracker>,
    /// Last proxy used per domain
    last_proxy: Mutex<HashMap<String, String>>,
}

impl AdaptiveStrategyEngine {
    pub fn new(defaults: StrategyConfig, tracker: Arc<SiteReputationTracker>) -> Self {
        Self {
            defaults,
            tracker,
            last_proxy: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<SiteReputationTracker> {
        &self.tracker
    }

    /// Builds the strategy for a URL
    ///
    /// Adjustments are applied in order: problematic-domain escalation,
    /// the tracker's header/timeout/retry recommendations, error-histogram
    /// tweaks, and finally a random User-Agent when requested.
    pub fn strategy_for_url(&self, url: &str) -> ScrapeStrategy {
        let mut strategy = ScrapeStrategy::from(&self.defaults);

        if self.tracker.is_problematic(url) {
            strategy.retries = strategy.retries.saturating_mul(2);
            strategy.timeout_ms = strategy.timeout_ms.saturating_mul(2);
            strategy.initial_backoff_ms = shrink(strategy.initial_backoff_ms);
            strategy.use_random_user_agent = true;
            strategy.rotate_proxies_on_retry = true;
            strategy.validate_proxies = true;
        }

        strategy.headers.extend(self.tracker.optimal_headers(url));

        let base_timeout = Duration::from_millis(self.defaults.timeout_ms);
        let tracker_timeout = self.tracker.optimal_timeout(url, base_timeout).as_millis() as u64;
        strategy.timeout_ms = strategy.timeout_ms.max(tracker_timeout);
        strategy.retries = strategy
            .retries
            .max(self.tracker.optimal_retries(url, self.defaults.retries));

        if let Some(site) = self.tracker.reputation(url) {
            if site.has_pattern(ErrorPattern::Timeout) {
                strategy.backoff_multiplier = strategy.backoff_multiplier.max(2.0);
            }
            if site.has_pattern(ErrorPattern::ConnectionReset) {
                strategy.initial_backoff_ms = shrink(strategy.initial_backoff_ms);
                strategy.rotate_proxies_on_retry = true;
            }
        }

        if strategy.use_random_user_agent {
            if let Some(agent) = USER_AGENT_POOL.choose(&mut rand::thread_rng()) {
                strategy
                    .headers
                    .insert("User-Agent".to_string(), agent.to_string());
            }
        }

        tracing::debug!(
            "Strategy for {}: retries={} timeout={}ms backoff={}ms x{}",
            url,
            strategy.retries,
            strategy.timeout_ms,
            strategy.initial_backoff_ms,
            strategy.backoff_multiplier
        );
        strategy
    }

    /// Remembers which proxy served the URL's domain
    pub fn record_proxy_use(&self, url: &str, proxy: &str) {
        if let Ok(domain) = domain_of(url) {
            self.last_proxy.lock().insert(domain, proxy.to_string());
        }
    }

    pub fn last_proxy(&self, url: &str) -> Option<String> {
        let domain = domain_of(url).ok()?;
        self.last_proxy.lock().get(&domain).cloned()
    }

    /// Picks a proxy for the next attempt
    ///
    /// After a connection-level failure, the first candidate in a different
    /// network than the last proxy used for the domain; after a TLS
    /// failure, the second candidate; otherwise the first. When no proxy
    /// was recorded for the domain, the last candidate stands in for it.
    pub fn select_optimal_proxy(
        &self,
        url: &str,
        candidates: &[String],
        last_error: Option<&CrawlError>,
    ) -> Option<String> {
        let first = candidates.first()?;
        let patterns = last_error.map(ErrorPattern::classify_error).unwrap_or_default();

        if patterns.iter().any(ErrorPattern::is_connection) {
            let reference = self
                .last_proxy(url)
                .or_else(|| candidates.last().cloned())
                .unwrap_or_default();
            let reference_class = network_class(&reference);

            let different = candidates
                .iter()
                .find(|candidate| network_class(candidate) != reference_class);
            return Some(different.unwrap_or(first).clone());
        }

        if patterns.iter().any(ErrorPattern::is_tls) {
            return Some(candidates.get(1).unwrap_or(first).clone());
        }

        Some(first.clone())
    }
}

fn shrink(backoff_ms: u64) -> u64 {
    (backoff_ms / 2).max(MIN_INITIAL_BACKOFF_MS.min(backoff_ms))
}
