//! Crawl-Pilot: request orchestration for crawling through rotating proxies
//!
//! This crate decides, for every outbound request, when it may run, how
//! aggressively it is retried, and which policy (headers, timeout, backoff,
//! proxy rotation) applies. Policy adapts from per-domain success/failure
//! history and from the target's robots.txt.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod limiter;
pub mod reputation;
pub mod robots;
pub mod scheduler;
pub mod strategy;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Crawl-Pilot operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} for {url}: {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {url}: {message}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDisallowed { url: String },

    #[error("Parse error for {url}: {message}")]
    Parsing { url: String, message: String },

    #[error("Task {task_id} was cancelled before it started")]
    Cancelled { task_id: u64 },

    #[error("Task {task_id} aborted before producing a result")]
    TaskAborted { task_id: u64 },

    /// A failure surfaced by the rate limiter, with the context a caller
    /// needs to decide on re-submission.
    #[error("Request to {url} ({domain}) failed after {retries} retries: {source}")]
    Request {
        domain: String,
        url: String,
        retries: u32,
        #[source]
        source: Box<CrawlError>,
    },

    #[error("Invalid task transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: scheduler::TaskStatus,
        to: scheduler::TaskStatus,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`CrawlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    HttpStatus,
    RateLimit,
    RobotsDisallowed,
    Parsing,
    Cancelled,
    Other,
}

impl CrawlError {
    /// Returns the kind of the underlying failure, looking through
    /// the rate limiter's context wrapper
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Reqwest(_) | Self::Io(_) => ErrorKind::Network,
            Self::HttpStatus { status: 429, .. } => ErrorKind::RateLimit,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::RobotsDisallowed { .. } => ErrorKind::RobotsDisallowed,
            Self::Parsing { .. } | Self::UrlError(_) => ErrorKind::Parsing,
            Self::Cancelled { .. } | Self::TaskAborted { .. } => ErrorKind::Cancelled,
            Self::Request { source, .. } => source.kind(),
            Self::InvalidTransition { .. } | Self::Config(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Returns the HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Request { source, .. } => source.status(),
            Self::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether an outer, strategy-aware retry loop should try again
    ///
    /// Rate-limit failures are retryable on their own, but once the rate
    /// limiter has surfaced one it has already exhausted its retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Io(_) => true,
            Self::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::RateLimited { .. } => true,
            Self::Request { source, .. } => {
                source.kind() != ErrorKind::RateLimit && source.is_retryable()
            }
            _ => false,
        }
    }

    /// Returns the innermost error, unwrapping rate limiter context
    pub fn root(&self) -> &CrawlError {
        match self {
            Self::Request { source, .. } => source.root(),
            other => other,
        }
    }

    /// Number of internal retries the rate limiter spent on this failure
    pub fn retries(&self) -> u32 {
        match self {
            Self::Request { retries, .. } => *retries,
            _ => 0,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Crawl-Pilot operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Crawler;
pub use limiter::RateLimiter;
pub use reputation::SiteReputationTracker;
pub use robots::RobotsPolicyEngine;
pub use scheduler::TaskScheduler;
pub use strategy::{AdaptiveStrategyEngine, ScrapeStrategy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_looks_through_request_wrapper() {
        let err = CrawlError::Request {
            domain: "example.com".to_string(),
            url: "https://example.com/".to_string(),
            retries: 2,
            source: Box::new(CrawlError::HttpStatus {
                url: "https://example.com/".to_string(),
                status: 429,
                message: "Too Many Requests".to_string(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.retries(), 2);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |status| CrawlError::HttpStatus {
            url: "https://example.com/".to_string(),
            status,
            message: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(408).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!status(403).is_retryable());
    }

    #[test]
    fn test_robots_disallowed_not_retryable() {
        let err = CrawlError::RobotsDisallowed {
            url: "https://example.com/admin".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::RobotsDisallowed);
    }

    #[test]
    fn test_wrapped_network_error_stays_retryable() {
        let err = CrawlError::Request {
            domain: "example.com".to_string(),
            url: "https://example.com/".to_string(),
            retries: 0,
            source: Box::new(CrawlError::Network {
                url: "https://example.com/".to_string(),
                message: "connection reset by peer".to_string(),
            }),
        };
        assert!(err.is_retryable());
        assert!(matches!(err.root(), CrawlError::Network { .. }));
        assert!(err.to_string().contains("connection reset by peer"));
    }
}
