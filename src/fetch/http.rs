//! reqwest-backed implementation of [`HttpFetch`]
//!
//! This module handles:
//! - Building HTTP clients with the crawler's user agent string
//! - One client per egress proxy, built lazily and reused
//! - Mapping transport failures to [`CrawlError::Network`] with the full
//!   error chain, so the reputation tracker can classify them

use super::{FetchRequest, FetchResponse, HttpFetch};
use crate::config::UserAgentConfig;
use crate::{CrawlError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{redirect::Policy, Client, Proxy};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - Default User-Agent header; per-request headers override it
/// * `proxy` - Optional proxy URL all traffic is routed through
///
/// # Example
///
/// ```no_run
/// use crawl_pilot::fetch::build_http_client;
///
/// let client = build_http_client("crawl-pilot/0.1", None).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, proxy: Option<&str>) -> std::result::Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// Fetcher that sends requests with reqwest
pub struct ReqwestFetcher {
    user_agent: String,
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl ReqwestFetcher {
    /// Creates a fetcher identifying itself with the configured user agent
    pub fn new(config: &UserAgentConfig) -> std::result::Result<Self, reqwest::Error> {
        let user_agent = config.header_value();
        let direct = build_http_client(&user_agent, None)?;

        Ok(Self {
            user_agent,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxied.lock();
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.user_agent, Some(proxy))?;
        tracing::debug!("Built HTTP client for proxy {}", proxy);
        clients.insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let client = self.client_for(request.proxy.as_deref())?;

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| network_error(&request.url, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| network_error(&request.url, &e))?;

        tracing::trace!("{} -> {} ({} bytes)", request.url, status, body.len());

        Ok(FetchResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}

/// Classifies a reqwest error into a network error with a descriptive message
fn network_error(url: &str, error: &reqwest::Error) -> CrawlError {
    let prefix = if error.is_timeout() {
        "timeout"
    } else if error.is_connect() {
        "connection error"
    } else if error.is_redirect() {
        "redirect error"
    } else if error.is_body() || error.is_decode() {
        "connection closed while reading body"
    } else {
        "request error"
    };

    CrawlError::Network {
        url: url.to_string(),
        message: format!("{}: {}", prefix, error_chain(error)),
    }
}

/// Joins an error with all of its sources
///
/// reqwest hides the interesting part (reset, refused, certificate) in the
/// source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
