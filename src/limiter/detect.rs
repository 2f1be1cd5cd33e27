//! Rate-limit detection
//!
//! Structured errors are checked first: [`CrawlError::RateLimited`] and
//! HTTP 429. Errors from callers that only carry text are matched against
//! the usual phrases, and a `retry-after` value is pulled from the text
//! when present.

use crate::fetch::retry_after_from_secs;
use crate::CrawlError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static RETRY_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry[-_ ]?after[\s:=]*(\d+(?:\.\d+)?)").expect("valid retry-after regex")
});

const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "too many requests", "429"];

/// Outcome of inspecting a failed attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    /// Not a rate-limit response
    Other,
    /// Rate limited, with the server's requested wait if it gave one
    RateLimited(Option<Duration>),
}

/// Classifies a failed attempt
pub fn detect(error: &CrawlError) -> Detection {
    match error.root() {
        CrawlError::RateLimited { retry_after, .. } => Detection::RateLimited(*retry_after),
        CrawlError::HttpStatus { status: 429, .. } => Detection::RateLimited(None),
        CrawlError::HttpStatus { .. } | CrawlError::RobotsDisallowed { .. } => Detection::Other,
        other => detect_text(&other.to_string()),
    }
}

/// Classifies an error message
pub fn detect_text(message: &str) -> Detection {
    let lower = message.to_lowercase();
    if !RATE_LIMIT_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return Detection::Other;
    }
    Detection::RateLimited(retry_after_from_text(message))
}

fn retry_after_from_text(message: &str) -> Option<Duration> {
    let captures = RETRY_AFTER.captures(message)?;
    let seconds: f64 = captures.get(1)?.as_str().parse().ok()?;
    retry_after_from_secs(seconds)
}
