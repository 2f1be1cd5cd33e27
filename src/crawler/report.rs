//! Crawl outcome summaries
//!
//! Collects per-URL results and the per-domain reputation snapshot of a
//! batch run, and renders them for the CLI.

use crate::fetch::FetchResponse;
use crate::reputation::SiteReputation;
use crate::{ErrorKind, Result};
use std::collections::BTreeMap;

/// Result of fetching one URL
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOutcome {
    pub url: String,
    /// HTTP status, from the response or from the status error
    pub status: Option<u16>,
    /// Body length in bytes on success
    pub bytes: usize,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl CrawlOutcome {
    pub fn new(url: String, result: Result<FetchResponse>) -> Self {
        match result {
            Ok(response) => Self {
                url,
                status: Some(response.status),
                bytes: response.body.len(),
                error_kind: None,
                error: None,
            },
            Err(error) => Self {
                url,
                status: error.status(),
                bytes: 0,
                error_kind: Some(error.kind()),
                error: Some(error.to_string()),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a batch of fetches
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// One entry per requested URL, in request order
    pub outcomes: Vec<CrawlOutcome>,

    /// Tracked domains, most recently accessed first
    pub reputations: Vec<SiteReputation>,
}

impl CrawlReport {
    pub fn new(outcomes: Vec<CrawlOutcome>, reputations: Vec<SiteReputation>) -> Self {
        Self {
            outcomes,
            reputations,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failure counts per error kind
    pub fn errors_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.outcomes.iter().filter_map(|o| o.error_kind) {
            *counts.entry(format!("{:?}", kind)).or_insert(0) += 1;
        }
        counts
    }

    /// Share of successful URLs in percent
    pub fn success_percentage(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            (self.succeeded() as f64 / self.outcomes.len() as f64) * 100.0
        }
    }
}

/// Prints the report to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Results ===\n");

    for outcome in &report.outcomes {
        match (&outcome.error, outcome.status) {
            (None, Some(status)) => {
                println!("  [{}] {} ({} bytes)", status, outcome.url, outcome.bytes)
            }
            (None, None) => println!("  [ok] {}", outcome.url),
            (Some(error), _) => println!("  [failed] {}: {}", outcome.url, error),
        }
    }
    println!();

    let errors = report.errors_by_kind();
    if !errors.is_empty() {
        println!("Error Summary:");
        let mut counts: Vec<_> = errors.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !report.reputations.is_empty() {
        println!("Site Reputation ({} domains):", report.reputations.len());
        for site in &report.reputations {
            let flag = if site.is_poor() { " [problematic]" } else { "" };
            println!(
                "  - {}: {:.1}% success ({} ok / {} failed){}",
                site.domain,
                site.success_rate() * 100.0,
                site.success_count,
                site.failure_count,
                flag
            );
            if let Some(pattern) = site.dominant_pattern() {
                println!(
                    "    dominant error: {} ({}x)",
                    pattern,
                    site.pattern_count(pattern)
                );
            }
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} URLs fetched)",
        report.success_percentage(),
        report.succeeded(),
        report.outcomes.len()
    );
}
