//! URL handling module for Crawl-Pilot
//!
//! This module provides domain extraction, robots.txt location, and the
//! port inspection the reputation tracker relies on.

mod domain;

pub use domain::{domain_of, explicit_port, extract_domain, parse_http_url, robots_path};

/// Builds the robots.txt URL for a domain
///
/// ```
/// use crawl_pilot::url::robots_url;
///
/// assert_eq!(robots_url("https", "example.com"), "https://example.com/robots.txt");
/// ```
pub fn robots_url(scheme: &str, domain: &str) -> String {
    format!("{}://{}/robots.txt", scheme, domain)
}

/// Returns true if the URL explicitly names port 443
pub fn targets_port_443(url_str: &str) -> bool {
    explicit_port(url_str) == Some(443)
}
