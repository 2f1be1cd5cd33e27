use super::QueuedRequest;
use crate::config::LimiterConfig;
use crate::fetch::MAX_RETRY_AFTER;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Active rate-limit backoff for a domain
///
/// Created on the first detected rate limit, refreshed on later ones,
/// and removed on the next success or once `retry_after` has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub domain: String,
    /// No request to the domain runs before this instant
    pub retry_after: Instant,
    /// Consecutive rate-limit hits
    pub retry_count: u32,
    pub current_backoff: Duration,
}

impl RateLimitStatus {
    pub fn remaining(&self, now: Instant) -> Duration {
        self.retry_after.saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.retry_after <= now
    }
}

/// Per-domain queue and pacing state
///
/// `draining` is true while a drain loop owns the queue; at most one loop
/// runs per domain.
#[derive(Default)]
pub(super) struct DomainQueue {
    pub pending: VecDeque<QueuedRequest>,
    pub draining: bool,
    pub last_request_time: Option<Instant>,
    pub request_count: u64,
    pub rate_limit: Option<RateLimitStatus>,
    /// Crawl delay declared by robots.txt
    pub crawl_delay: Option<Duration>,
}

impl DomainQueue {
    /// Inserts a request keeping priority-descending, submission-ascending order
    pub fn enqueue(&mut self, request: QueuedRequest) {
        let position = self
            .pending
            .iter()
            .position(|queued| {
                (queued.priority, std::cmp::Reverse(queued.sequence))
                    < (request.priority, std::cmp::Reverse(request.sequence))
            })
            .unwrap_or(self.pending.len());
        self.pending.insert(position, request);
    }

    /// Minimum spacing between two requests to this domain
    pub fn spacing(&self, config: &LimiterConfig, domain: &str) -> Duration {
        let configured = config
            .delay_for(domain)
            .max(Duration::from_millis(config.default_delay_ms));
        self.crawl_delay.unwrap_or(Duration::ZERO).max(configured)
    }

    /// Returns the active rate-limit status, dropping it once expired
    pub fn active_rate_limit(&mut self, now: Instant) -> Option<&RateLimitStatus> {
        if self.rate_limit.as_ref().map_or(false, |s| s.is_expired(now)) {
            self.rate_limit = None;
        }
        self.rate_limit.as_ref()
    }

    /// How long the next request has to wait
    ///
    /// The remaining spacing is jittered by `±jitter_factor`; an active
    /// rate-limit backoff is a hard floor.
    pub fn time_until_next_request(
        &mut self,
        config: &LimiterConfig,
        domain: &str,
        now: Instant,
    ) -> Duration {
        let spacing_wait = match self.last_request_time {
            Some(last) => self
                .spacing(config, domain)
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        let spacing_wait = apply_jitter(spacing_wait, config.jitter_factor);

        let backoff_wait = self
            .active_rate_limit(now)
            .map_or(Duration::ZERO, |status| status.remaining(now));

        spacing_wait.max(backoff_wait)
    }

    /// Records that a request was made to this domain
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Marks this domain as rate limited and returns the refreshed status
    ///
    /// The first hit starts at the initial backoff; each later hit grows it
    /// by the multiplier up to the maximum. The domain stays closed for
    /// the longer of the server's hint (or the default) and the backoff.
    pub fn mark_rate_limited(
        &mut self,
        config: &LimiterConfig,
        domain: &str,
        hint: Option<Duration>,
        now: Instant,
    ) -> &RateLimitStatus {
        let (retry_count, current_backoff) = match &self.rate_limit {
            Some(status) => (
                status.retry_count + 1,
                Duration::try_from_secs_f64(
                    status.current_backoff.as_secs_f64() * config.backoff_multiplier,
                )
                .unwrap_or(Duration::MAX)
                .min(config.max_backoff()),
            ),
            None => (1, config.initial_backoff().min(config.max_backoff())),
        };

        let wait = hint
            .unwrap_or_else(|| config.default_retry_after())
            .max(current_backoff)
            .min(MAX_RETRY_AFTER);

        self.rate_limit.insert(RateLimitStatus {
            domain: domain.to_string(),
            retry_after: now + wait,
            retry_count,
            current_backoff,
        })
    }

    /// Clears the rate limit status after a success
    pub fn clear_rate_limit(&mut self) {
        self.rate_limit = None;
    }
}

fn apply_jitter(wait: Duration, jitter_factor: f64) -> Duration {
    if wait.is_zero() || jitter_factor <= 0.0 {
        return wait;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter_factor..=jitter_factor);
    wait.mul_f64(factor.max(0.0))
}
