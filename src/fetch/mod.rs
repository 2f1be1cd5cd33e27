//! External collaborator seams
//!
//! Transport and proxy pools live outside the orchestration core. This
//! module defines the contracts the core consumes:
//! - [`HttpFetch`]: `(url, headers, timeout, proxy) -> (status, headers, body)`
//! - [`ProxySource`]: a validated proxy pool with `next()` / `revalidate()`
//!
//! plus reqwest- and list-backed default implementations.

mod http;
mod proxy;

pub use http::{build_http_client, ReqwestFetcher};
pub use proxy::StaticProxyList;

use crate::{CrawlError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// A single outbound request, fully resolved by the strategy engine
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub proxy: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            proxy: None,
        }
    }
}

/// Response of a fetch; non-success statuses are still `Ok` at this level
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    /// Header names are lowercase
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Turns an unsuccessful status into the matching [`CrawlError`]
    ///
    /// 429 becomes [`CrawlError::RateLimited`] carrying the parsed
    /// `Retry-After`; every other status >= 400 becomes
    /// [`CrawlError::HttpStatus`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        if self.status == 429 {
            let retry_after = self.header("retry-after").and_then(parse_retry_after);
            return Err(CrawlError::RateLimited {
                url: self.url,
                retry_after,
                message: "429 Too Many Requests".to_string(),
            });
        }

        Err(CrawlError::HttpStatus {
            message: status_reason(self.status).to_string(),
            url: self.url,
            status: self.status,
        })
    }
}

/// Longest wait a server can impose through `Retry-After`
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Parses a `Retry-After` value: delta-seconds or an HTTP date
///
/// Values beyond [`MAX_RETRY_AFTER`] are clamped to it.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return retry_after_from_secs(seconds);
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO).min(MAX_RETRY_AFTER))
}

/// Converts a delta-seconds value; `None` for negative or NaN input
pub(crate) fn retry_after_from_secs(seconds: f64) -> Option<Duration> {
    if seconds.is_nan() || seconds < 0.0 {
        return None;
    }
    let wait = Duration::try_from_secs_f64(seconds).unwrap_or(MAX_RETRY_AFTER);
    Some(wait.min(MAX_RETRY_AFTER))
}

fn status_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unexpected status")
}

/// HTTP fetch primitive
///
/// Implementations return `Ok` for any HTTP response, including error
/// statuses, and `Err(CrawlError::Network)` for transport failures.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// A pool of validated egress proxies
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// The next proxy to use, or `None` when the pool is empty
    async fn next(&self) -> Option<String>;

    /// Re-checks that a proxy is still usable
    async fn revalidate(&self, proxy: &str) -> bool;

    /// Every proxy currently in the pool, in pool order
    fn candidates(&self) -> Vec<String>;

    /// Reports that a request through `proxy` failed at the transport level
    async fn report_failure(&self, _proxy: &str) {}
}
