//! Per-domain reputation tracking
//!
//! Every request outcome is recorded against the URL's domain. The
//! accumulated success rate and error-pattern histogram drive the
//! header, timeout, and retry recommendations the strategy engine layers
//! on top of its defaults.
//!
//! Entries are created lazily and bounded: once more than
//! `max-tracked-sites` domains are known, the least recently recorded one
//! is evicted. Read-only queries do not count as an access.

mod pattern;

pub use pattern::ErrorPattern;

use crate::config::ReputationConfig;
use crate::url::{domain_of, targets_port_443};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Success rate below which a domain with enough history is problematic
const POOR_SUCCESS_RATE: f64 = 0.5;

/// Attempts needed before the success rate is trusted
const MIN_ATTEMPTS: u64 = 3;

const MAX_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 10;

/// Accumulated history for one domain
#[derive(Debug, Clone, PartialEq)]
pub struct SiteReputation {
    pub domain: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_histogram: HashMap<ErrorPattern, u64>,
    pub last_access_time: DateTime<Utc>,
}

impl SiteReputation {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            success_count: 0,
            failure_count: 0,
            error_histogram: HashMap::new(),
            last_access_time: Utc::now(),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// `success / (success + failure)`, 0 when nothing was recorded
    pub fn success_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.success_count as f64 / n as f64,
        }
    }

    pub fn pattern_count(&self, pattern: ErrorPattern) -> u64 {
        self.error_histogram.get(&pattern).copied().unwrap_or(0)
    }

    pub fn has_pattern(&self, pattern: ErrorPattern) -> bool {
        self.pattern_count(pattern) > 0
    }

    /// Low success rate over enough attempts, or a severe pattern fired
    pub fn is_poor(&self) -> bool {
        let low_rate =
            self.attempts() >= MIN_ATTEMPTS && self.success_rate() < POOR_SUCCESS_RATE;
        low_rate || ErrorPattern::ALL.iter().any(|p| p.is_severe() && self.has_pattern(*p))
    }

    /// The most frequent pattern, if any failure was classified
    pub fn dominant_pattern(&self) -> Option<ErrorPattern> {
        self.error_histogram
            .iter()
            .filter(|(_, count)| **count > 0)
            .max_by_key(|(pattern, count)| (**count, std::cmp::Reverse(**pattern)))
            .map(|(pattern, _)| *pattern)
    }

    fn touch(&mut self) {
        self.last_access_time = Utc::now();
    }
}

/// Tracks success/failure history per domain
pub struct SiteReputationTracker {
    sites: Mutex<LruCache<String, SiteReputation>>,
}

impl SiteReputationTracker {
    /// Creates a tracker that keeps at most `max_sites` domains (minimum 1)
    pub fn new(max_sites: usize) -> Self {
        let capacity = NonZeroUsize::new(max_sites).unwrap_or(NonZeroUsize::MIN);
        Self {
            sites: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &ReputationConfig) -> Self {
        Self::new(config.max_tracked_sites)
    }

    pub fn capacity(&self) -> usize {
        self.sites.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.sites.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.lock().is_empty()
    }

    /// Applies `update` to the domain's entry, creating it if needed
    fn record<F>(&self, url: &str, update: F)
    where
        F: FnOnce(&mut SiteReputation),
    {
        let domain = match domain_of(url) {
            Ok(domain) => domain,
            Err(e) => {
                tracing::debug!("Not recording outcome for {}: {}", url, e);
                return;
            }
        };

        let mut sites = self.sites.lock();
        if let Some(site) = sites.get_mut(&domain) {
            site.touch();
            update(site);
            return;
        }

        let mut site = SiteReputation::new(domain.clone());
        update(&mut site);
        if let Some((evicted, _)) = sites.push(domain, site) {
            tracing::info!("Evicted reputation for {}", evicted);
        }
    }

    /// Records a successful request
    pub fn record_success(&self, url: &str) {
        self.record(url, |site| site.success_count += 1);
    }

    /// Records a failed request, classifying its message into the histogram
    pub fn record_failure(&self, url: &str, message: &str) {
        let patterns = ErrorPattern::classify(message);
        self.record(url, |site| Self::apply_failure(site, &patterns));
    }

    /// Records a failed request from a structured error
    pub fn record_error(&self, url: &str, error: &CrawlError) {
        let patterns = ErrorPattern::classify_error(error);
        self.record(url, |site| Self::apply_failure(site, &patterns));
    }

    fn apply_failure(site: &mut SiteReputation, patterns: &[ErrorPattern]) {
        site.failure_count += 1;
        for pattern in patterns {
            *site.error_histogram.entry(*pattern).or_insert(0) += 1;
        }
        if !patterns.is_empty() {
            tracing::trace!("{} failure patterns: {:?}", site.domain, patterns);
        }
    }

    /// Snapshot of a domain's reputation, without counting as an access
    pub fn reputation(&self, url: &str) -> Option<SiteReputation> {
        let domain = domain_of(url).ok()?;
        self.sites.lock().peek(&domain).cloned()
    }

    /// Success rate of the URL's domain, 0 for unknown domains
    pub fn success_rate(&self, url: &str) -> f64 {
        self.reputation(url).map_or(0.0, |site| site.success_rate())
    }

    /// Whether requests to this URL need the careful treatment
    ///
    /// True for a poor track record, or when the URL names port 443
    /// explicitly (such targets tend to sit behind stricter front ends).
    pub fn is_problematic(&self, url: &str) -> bool {
        if targets_port_443(url) {
            return true;
        }
        self.reputation(url).map_or(false, |site| site.is_poor())
    }

    /// Headers to send to this URL
    pub fn optimal_headers(&self, url: &str) -> BTreeMap<String, String> {
        let mut headers = base_headers();

        if self.is_problematic(url) {
            headers.extend(owned(BROWSER_HEADERS));
        }

        let tls_trouble = self.reputation(url).map_or(false, |site| {
            site.has_pattern(ErrorPattern::Ssl) || site.has_pattern(ErrorPattern::Certificate)
        });
        if tls_trouble {
            headers.extend(owned(SEC_FETCH_HEADERS));
        }

        headers
    }

    /// Timeout for this URL given a base value, capped at 120s
    pub fn optimal_timeout(&self, url: &str, base: Duration) -> Duration {
        let mut timeout = base;
        if self.is_problematic(url) {
            timeout = timeout.mul_f64(1.5);
        }

        let timed_out = self
            .reputation(url)
            .map_or(false, |site| site.has_pattern(ErrorPattern::Timeout));
        if timed_out {
            timeout *= 2;
        }
        timeout.min(MAX_TIMEOUT.max(base))
    }

    /// Retry budget for this URL given a base value, capped at 10
    pub fn optimal_retries(&self, url: &str, base: u32) -> u32 {
        let mut retries = base;
        if self.is_problematic(url) {
            retries = retries.saturating_mul(2);
        }
        if let Some(site) = self.reputation(url) {
            if site.has_pattern(ErrorPattern::ConnectionReset)
                || site.has_pattern(ErrorPattern::ConnectionClosed)
            {
                retries = retries.saturating_add(1);
            }
        }
        retries.min(MAX_RETRIES.max(base))
    }

    /// All tracked domains, most recently recorded first
    pub fn snapshot(&self) -> Vec<SiteReputation> {
        self.sites.lock().iter().map(|(_, site)| site.clone()).collect()
    }

    pub fn clear(&self) {
        self.sites.lock().clear();
    }
}

impl Default for SiteReputationTracker {
    fn default() -> Self {
        Self::from_config(&ReputationConfig::default())
    }
}

const BASE_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
];

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("DNT", "1"),
    ("Pragma", "no-cache"),
    ("Upgrade-Insecure-Requests", "1"),
];

const SEC_FETCH_HEADERS: &[(&str, &str)] = &[
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
];

fn owned(pairs: &'static [(&'static str, &'static str)]) -> impl Iterator<Item = (String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))
}

fn base_headers() -> BTreeMap<String, String> {
    owned(BASE_HEADERS).collect()
}
