//! Robots.txt caching implementation
//!
//! Rule sets are kept per domain along with the time they were fetched and
//! expire after a configurable TTL. Expired entries are re-fetched lazily on
//! the next lookup, never refreshed in the background.

use crate::robots::RobotsRuleSet;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Cached robots.txt rules for a domain
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed rules
    pub rules: Arc<RobotsRuleSet>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots stamped with the current time
    pub fn new(rules: RobotsRuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached rules are older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Returns the age of the cached rules
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}
