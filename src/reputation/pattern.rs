use crate::CrawlError;
use std::fmt;

/// Buckets of the per-domain error histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorPattern {
    ConnectionClosed,
    ConnectionReset,
    Timeout,
    Ssl,
    Certificate,
    Proxy,
    Redirect,
    Refused,
}

impl ErrorPattern {
    pub const ALL: [ErrorPattern; 8] = [
        Self::ConnectionClosed,
        Self::ConnectionReset,
        Self::Timeout,
        Self::Ssl,
        Self::Certificate,
        Self::Proxy,
        Self::Redirect,
        Self::Refused,
    ];

    /// Lowercase substrings that identify this pattern in an error message
    fn needles(&self) -> &'static [&'static str] {
        match self {
            Self::ConnectionClosed => &["connection closed", "socket hang up", "closed while"],
            Self::ConnectionReset => &["connection reset", "econnreset", "reset by peer"],
            Self::Timeout => &["timeout", "timed out", "etimedout"],
            Self::Ssl => &["ssl", "tls", "handshake"],
            Self::Certificate => &["certificate", "cert_", "self signed", "self-signed"],
            Self::Proxy => &["proxy", "407"],
            Self::Redirect => &["redirect"],
            Self::Refused => &["connection refused", "econnrefused"],
        }
    }

    /// Patterns that mark a domain as problematic as soon as they fire once
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::ConnectionReset
                | Self::Timeout
                | Self::Ssl
                | Self::Certificate
        )
    }

    /// Connection-level failures, where switching network path helps
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::ConnectionReset | Self::Refused | Self::Timeout
        )
    }

    /// TLS-level failures
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Ssl | Self::Certificate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionClosed => "connection-closed",
            Self::ConnectionReset => "connection-reset",
            Self::Timeout => "timeout",
            Self::Ssl => "ssl",
            Self::Certificate => "certificate",
            Self::Proxy => "proxy",
            Self::Redirect => "redirect",
            Self::Refused => "refused",
        }
    }

    /// Every pattern whose substrings occur in `message`
    ///
    /// A message can match several buckets, e.g. a TLS handshake timeout.
    pub fn classify(message: &str) -> Vec<ErrorPattern> {
        let message = message.to_lowercase();
        Self::ALL
            .into_iter()
            .filter(|pattern| pattern.needles().iter().any(|n| message.contains(n)))
            .collect()
    }

    /// Classifies a structured error, falling back to its text
    pub fn classify_error(error: &CrawlError) -> Vec<ErrorPattern> {
        match error.root() {
            CrawlError::RobotsDisallowed { .. } => Vec::new(),
            CrawlError::HttpStatus { status: 407, .. } => vec![Self::Proxy],
            CrawlError::HttpStatus { status, .. } if (300..400).contains(status) => {
                vec![Self::Redirect]
            }
            // Status errors carry a reason phrase, not transport text
            CrawlError::HttpStatus { .. } | CrawlError::RateLimited { .. } => Vec::new(),
            CrawlError::Reqwest(e) if e.is_timeout() => vec![Self::Timeout],
            CrawlError::Reqwest(e) if e.is_redirect() => vec![Self::Redirect],
            CrawlError::Network { message, .. } => Self::classify(message),
            other => Self::classify(&other.to_string()),
        }
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
