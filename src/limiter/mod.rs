//! Per-domain request pacing
//!
//! Every request is routed into its domain's queue. One drain loop per
//! domain pops requests in priority order, waits out the domain's spacing
//! (crawl-delay, configured delay, and any rate-limit backoff), and runs
//! them one at a time. Rate-limited attempts are re-queued until the
//! retry budget is spent; any other failure goes straight back to the
//! caller.

mod detect;
mod domain;

pub use detect::{detect, detect_text, Detection};
pub use domain::RateLimitStatus;

use crate::config::LimiterConfig;
use crate::robots::RobotsPolicyEngine;
use crate::url::domain_of;
use crate::{CrawlError, Result};
use domain::DomainQueue;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A type-erased request waiting in a domain queue
trait Job: Send {
    /// Runs one attempt; on success the result has already been delivered
    fn attempt(&mut self) -> BoxFuture<'static, Result<()>>;

    /// Fails the request with a final error
    fn reject(self: Box<Self>, error: CrawlError);

    /// True once the caller stopped waiting for the result
    fn is_abandoned(&self) -> bool;
}

type ReplySlot<T> = Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>;

struct TypedJob<T, F> {
    make: F,
    reply: ReplySlot<T>,
}

impl<T, F, Fut> Job for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    fn attempt(&mut self) -> BoxFuture<'static, Result<()>> {
        let call = (self.make)();
        let reply = Arc::clone(&self.reply);
        Box::pin(async move {
            let value = call.await?;
            let sender = reply.lock().take();
            if let Some(sender) = sender {
                let _ = sender.send(Ok(value));
            }
            Ok(())
        })
    }

    fn reject(self: Box<Self>, error: CrawlError) {
        let sender = self.reply.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(Err(error));
        }
    }

    fn is_abandoned(&self) -> bool {
        self.reply
            .lock()
            .as_ref()
            .map_or(true, |sender| sender.is_closed())
    }
}

/// A request in a domain queue
pub(crate) struct QueuedRequest {
    job: Box<dyn Job>,
    url: String,
    priority: i32,
    sequence: u64,
    enqueued_at: Instant,
    retry_count: u32,
}

struct Shared {
    config: LimiterConfig,
    robots: Option<Arc<RobotsPolicyEngine>>,
    domains: Mutex<HashMap<String, DomainQueue>>,
    sequence: AtomicU64,
}

/// Per-domain rate limiter
///
/// Cheap to clone; clones share queues and state.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a limiter that also enforces robots.txt rules and crawl delays
    pub fn with_robots(config: LimiterConfig, robots: Arc<RobotsPolicyEngine>) -> Self {
        Self::build(config, Some(robots))
    }

    fn build(config: LimiterConfig, robots: Option<Arc<RobotsPolicyEngine>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                robots,
                domains: Mutex::new(HashMap::new()),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.shared.config
    }

    /// Runs `make()` through the domain's queue and returns its result
    ///
    /// `make` is called again for every retry after a rate-limit response.
    /// Higher `priority` runs first within a domain; equal priorities run in
    /// submission order.
    ///
    /// # Errors
    ///
    /// * [`CrawlError::RobotsDisallowed`] - robots.txt forbids the URL; nothing was queued
    /// * [`CrawlError::UrlError`] - the URL has no usable domain
    /// * [`CrawlError::Request`] - the final failure, with domain, URL and retries spent
    pub async fn execute<T, F, Fut>(
        &self,
        url: &str,
        make: F,
        agent: Option<&str>,
        priority: i32,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let domain = domain_of(url)?;

        let mut crawl_delay = None;
        if let Some(robots) = &self.shared.robots {
            if !robots.is_allowed(url, agent).await? {
                return Err(CrawlError::RobotsDisallowed {
                    url: url.to_string(),
                });
            }
            crawl_delay = robots.crawl_delay(&domain, agent).await;
        }

        let (tx, rx) = oneshot::channel();
        let request = QueuedRequest {
            job: Box::new(TypedJob {
                make,
                reply: Arc::new(Mutex::new(Some(tx))),
            }),
            url: url.to_string(),
            priority,
            sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
            enqueued_at: Instant::now(),
            retry_count: 0,
        };

        let start_drain = {
            let mut domains = self.shared.domains.lock();
            let queue = domains.entry(domain.clone()).or_default();
            if crawl_delay.is_some() {
                queue.crawl_delay = crawl_delay;
            }
            queue.enqueue(request);
            tracing::trace!("Queued {} ({} pending for {})", url, queue.pending.len(), domain);

            !std::mem::replace(&mut queue.draining, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.shared), domain.clone()));
        }

        rx.await.map_err(|_| {
            CrawlError::Other(format!("rate limiter dropped request for {}", domain))
        })?
    }

    /// The domain's active rate-limit status, if it has not expired
    pub fn rate_limit_status(&self, domain: &str) -> Option<RateLimitStatus> {
        let mut domains = self.shared.domains.lock();
        domains
            .get_mut(domain)?
            .active_rate_limit(Instant::now())
            .cloned()
    }

    /// Number of requests waiting for the domain
    pub fn pending(&self, domain: &str) -> usize {
        self.shared
            .domains
            .lock()
            .get(domain)
            .map_or(0, |queue| queue.pending.len())
    }

    /// Requests started for the domain so far
    pub fn request_count(&self, domain: &str) -> u64 {
        self.shared
            .domains
            .lock()
            .get(domain)
            .map_or(0, |queue| queue.request_count)
    }

    /// Forgets the domain's pacing and rate-limit state
    ///
    /// Queued requests are kept and still run.
    pub fn reset_domain(&self, domain: &str) {
        if let Some(queue) = self.shared.domains.lock().get_mut(domain) {
            queue.clear_rate_limit();
            queue.last_request_time = None;
            queue.crawl_delay = None;
        }
    }
}

/// Drain loop for one domain; exits when the queue is empty
async fn drain(shared: Arc<Shared>, domain: String) {
    loop {
        let (mut request, wait) = {
            let mut domains = shared.domains.lock();
            let Some(queue) = domains.get_mut(&domain) else {
                return;
            };
            let Some(request) = queue.pending.pop_front() else {
                queue.draining = false;
                return;
            };
            let wait = queue.time_until_next_request(&shared.config, &domain, Instant::now());
            (request, wait)
        };

        if request.job.is_abandoned() {
            tracing::trace!("Skipping abandoned request for {}", request.url);
            continue;
        }

        if !wait.is_zero() {
            tracing::debug!("Waiting {:?} before requesting {}", wait, request.url);
            tokio::time::sleep(wait).await;
        }

        if let Some(queue) = shared.domains.lock().get_mut(&domain) {
            queue.record_request(Instant::now());
        }
        tracing::trace!(
            "Running {} after {:?} in queue",
            request.url,
            request.enqueued_at.elapsed()
        );

        let attempt = AssertUnwindSafe(async { request.job.attempt().await })
            .catch_unwind()
            .await;
        let error = match attempt {
            Ok(Ok(())) => {
                if let Some(queue) = shared.domains.lock().get_mut(&domain) {
                    queue.clear_rate_limit();
                }
                continue;
            }
            Ok(Err(error)) => error,
            Err(_) => {
                tracing::error!("Request to {} panicked", request.url);
                let error = CrawlError::Other(format!("request to {} panicked", request.url));
                reject(request, &domain, error);
                continue;
            }
        };

        match detect(&error) {
            Detection::RateLimited(hint) => {
                let retry_after = {
                    let mut domains = shared.domains.lock();
                    let queue = domains.entry(domain.clone()).or_default();
                    let status =
                        queue.mark_rate_limited(&shared.config, &domain, hint, Instant::now());
                    status.remaining(Instant::now())
                };

                if request.retry_count < shared.config.max_retries {
                    request.retry_count += 1;
                    tracing::info!(
                        "Rate limited by {}, retry {}/{} in {:?}",
                        domain,
                        request.retry_count,
                        shared.config.max_retries,
                        retry_after
                    );
                    if let Some(queue) = shared.domains.lock().get_mut(&domain) {
                        queue.enqueue(request);
                    }
                } else {
                    tracing::warn!(
                        "Giving up on {} after {} rate-limited retries",
                        request.url,
                        request.retry_count
                    );
                    reject(request, &domain, error);
                }
            }
            Detection::Other => reject(request, &domain, error),
        }
    }
}

fn reject(request: QueuedRequest, domain: &str, error: CrawlError) {
    let QueuedRequest {
        job,
        url,
        retry_count,
        ..
    } = request;
    job.reject(CrawlError::Request {
        domain: domain.to_string(),
        url,
        retries: retry_count,
        source: Box::new(error),
    });
}
