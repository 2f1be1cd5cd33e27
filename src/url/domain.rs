use crate::{UrlError, UrlResult};
use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawl_pilot::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Parses a URL string and returns its lowercase domain
///
/// Only HTTP(S) URLs are accepted; the domain is the unit of rate limiting
/// and reputation tracking. A non-default port stays part of the domain,
/// since it usually identifies a different site.
pub fn domain_of(url_str: &str) -> UrlResult<String> {
    let url = parse_http_url(url_str)?;
    let host = extract_domain(&url).ok_or(UrlError::MissingDomain)?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Parses a URL string, rejecting anything that is not HTTP or HTTPS
pub fn parse_http_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UrlError::InvalidScheme(other.to_string())),
    }
}

/// Returns the port written explicitly in the URL's authority, if any
///
/// `url::Url` drops default ports (`https://host:443/` reports no port), so
/// this inspects the raw string instead.
///
/// ```
/// use crawl_pilot::url::explicit_port;
///
/// assert_eq!(explicit_port("https://example.com:443/a"), Some(443));
/// assert_eq!(explicit_port("https://example.com/a"), None);
/// ```
pub fn explicit_port(url_str: &str) -> Option<u16> {
    let after_scheme = url_str.split_once("://").map(|(_, rest)| rest)?;
    let authority = after_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()?;
    // Strip credentials
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    // IPv6 literals carry colons inside brackets
    let port_part = match host_port.rfind(']') {
        Some(end) => host_port[end + 1..].strip_prefix(':')?,
        None => host_port.rsplit_once(':').map(|(_, p)| p)?,
    };

    port_part.parse().ok()
}

/// Returns the path plus query of a URL, the part robots rules match against
pub fn robots_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
