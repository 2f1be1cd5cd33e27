use crate::config::StrategyConfig;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Relative jitter applied to outer retry backoff
const BACKOFF_JITTER: f64 = 0.1;

/// Effective request policy for one URL
///
/// Recomputed for every request and never cached; it reflects the domain's
/// reputation at the moment it was built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScrapeStrategy {
    pub retries: u32,
    pub timeout_ms: u64,
    pub headers: BTreeMap<String, String>,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub use_random_user_agent: bool,
    pub rotate_proxies_on_retry: bool,
    pub validate_proxies: bool,
}

impl ScrapeStrategy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait before retry number `attempt` (0-based)
    ///
    /// `min(max, initial × multiplier^attempt)` with ±10% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_backoff_ms as f64);

        let spread = capped * BACKOFF_JITTER;
        let jittered = if spread > 0.0 {
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0) / 1000.0)
    }
}

impl From<&StrategyConfig> for ScrapeStrategy {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            retries: config.retries,
            timeout_ms: config.timeout_ms,
            headers: BTreeMap::new(),
            initial_backoff_ms: config.initial_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
            max_backoff_ms: config.max_backoff_ms,
            use_random_user_agent: config.use_random_user_agent,
            rotate_proxies_on_retry: config.rotate_proxies_on_retry,
            validate_proxies: config.validate_proxies,
        }
    }
}

impl Default for ScrapeStrategy {
    fn default() -> Self {
        Self::from(&StrategyConfig::default())
    }
}
