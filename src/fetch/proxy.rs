use super::ProxySource;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed proxy pool that hands out proxies round-robin
///
/// Proxies reported as failed are skipped by `next()` and fail
/// `revalidate()` until [`StaticProxyList::restore`] is called.
#[derive(Debug, Default)]
pub struct StaticProxyList {
    proxies: Vec<String>,
    cursor: AtomicUsize,
    failed: Mutex<HashSet<String>>,
}

impl StaticProxyList {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            cursor: AtomicUsize::new(0),
            failed: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Puts every failed proxy back into rotation
    pub fn restore(&self) {
        self.failed.lock().clear();
    }
}

#[async_trait]
impl ProxySource for StaticProxyList {
    async fn next(&self) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }

        let failed = self.failed.lock();
        for _ in 0..self.proxies.len() {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
            let proxy = &self.proxies[index];
            if !failed.contains(proxy) {
                return Some(proxy.clone());
            }
        }

        // Everything failed; keep rotating rather than stall the crawl
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(self.proxies[index].clone())
    }

    async fn revalidate(&self, proxy: &str) -> bool {
        self.proxies.iter().any(|p| p == proxy) && !self.failed.lock().contains(proxy)
    }

    fn candidates(&self) -> Vec<String> {
        let failed = self.failed.lock();
        self.proxies
            .iter()
            .filter(|p| !failed.contains(*p))
            .cloned()
            .collect()
    }

    async fn report_failure(&self, proxy: &str) {
        if self.proxies.iter().any(|p| p == proxy) {
            tracing::info!("Taking proxy {} out of rotation", proxy);
            self.failed.lock().insert(proxy.to_string());
        }
    }
}
