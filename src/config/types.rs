use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for Crawl-Pilot
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// URLs to fetch when the CLI runs without explicit URLs
    pub seeds: Vec<String>,
    pub limiter: LimiterConfig,
    pub robots: RobotsConfig,
    pub reputation: ReputationConfig,
    pub scheduler: SchedulerConfig,
    pub strategy: StrategyConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub proxies: ProxyConfig,
}

/// Per-domain pacing and rate-limit backoff
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LimiterConfig {
    /// Minimum time between requests to the same domain (milliseconds)
    pub default_delay_ms: u64,

    /// Per-domain overrides of the default delay (milliseconds)
    pub domain_delays: HashMap<String, u64>,

    /// Internal retries for rate-limited requests
    pub max_retries: u32,

    /// Backoff applied on the first rate-limit hit (milliseconds)
    pub initial_backoff_ms: u64,

    /// Growth factor of the backoff on repeated hits
    pub backoff_multiplier: f64,

    /// Upper bound of the backoff (milliseconds)
    pub max_backoff_ms: u64,

    /// Relative jitter applied to every wait, e.g. 0.1 for ±10%
    pub jitter_factor: f64,

    /// Wait used when a rate-limit response carries no retry-after (milliseconds)
    pub default_retry_after_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 1000,
            domain_delays: HashMap::new(),
            max_retries: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 300_000,
            jitter_factor: 0.1,
            default_retry_after_ms: 60_000,
        }
    }
}

impl LimiterConfig {
    /// Configured delay for a domain, falling back to the default
    pub fn delay_for(&self, domain: &str) -> Duration {
        let ms = self
            .domain_delays
            .get(domain)
            .copied()
            .unwrap_or(self.default_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.default_retry_after_ms)
    }
}

/// robots.txt handling
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RobotsConfig {
    /// When false, every URL is allowed and robots.txt is never fetched
    pub respect_robots_txt: bool,

    /// How long a fetched rule set stays valid (milliseconds)
    pub cache_ttl_ms: u64,

    /// Scheme used to fetch robots.txt ("https" or "http")
    pub scheme: String,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            cache_ttl_ms: 3_600_000,
            scheme: "https".to_string(),
        }
    }
}

/// Site reputation tracking
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReputationConfig {
    /// Maximum number of domains kept in memory
    pub max_tracked_sites: usize,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            max_tracked_sites: 1000,
        }
    }
}

/// Global task admission
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Maximum number of tasks executing at once across all domains
    pub max_concurrent_tasks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
        }
    }
}

/// Default request strategy, before reputation adjustments
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StrategyConfig {
    pub retries: u32,
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub use_random_user_agent: bool,
    pub rotate_proxies_on_retry: bool,
    pub validate_proxies: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout_ms: 30_000,
            initial_backoff_ms: 1000,
            backoff_multiplier: 1.5,
            max_backoff_ms: 30_000,
            use_random_user_agent: false,
            rotate_proxies_on_retry: false,
            validate_proxies: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the agent matched against robots.txt groups
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "crawl-pilot".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: String::new(),
        }
    }
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        if self.contact_url.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, self.contact_url
            )
        }
    }
}

/// Egress proxies
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy URLs, e.g. `http://10.0.0.1:8080`
    pub list: Vec<String>,
}
