//! Crawl-Pilot main entry point
//!
//! This is the command-line interface for the crawl-pilot request orchestrator.

use anyhow::Context;
use clap::Parser;
use crawl_pilot::config::{load_config_with_hash, Config};
use crawl_pilot::crawler::print_report;
use crawl_pilot::{AdaptiveStrategyEngine, Crawler, SiteReputationTracker};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Crawl-Pilot: a polite, adaptive request orchestrator
///
/// Fetches URLs while respecting robots.txt and per-domain rate limits,
/// adapting timeouts, retries and headers to each site's track record.
#[derive(Parser, Debug)]
#[command(name = "crawl-pilot")]
#[command(version)]
#[command(about = "A polite, adaptive request orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to fetch in addition to the configured seeds
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "strategy")]
    dry_run: bool,

    /// Print the resolved request strategy for each URL and exit
    #[arg(long, conflicts_with = "dry_run")]
    strategy: bool,

    /// Request priority for every URL (higher runs first)
    #[arg(long, default_value_t = 0)]
    priority: i32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let urls: Vec<String> = config
        .seeds
        .iter()
        .cloned()
        .chain(cli.urls.iter().cloned())
        .collect();

    if cli.dry_run {
        handle_dry_run(&config, &urls);
    } else if cli.strategy {
        handle_strategy(&config, &urls)?;
    } else {
        handle_crawl(&config, &urls, cli.priority).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_pilot=info,warn"),
            1 => EnvFilter::new("crawl_pilot=debug,info"),
            2 => EnvFilter::new("crawl_pilot=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config, urls: &[String]) {
    println!("=== Crawl-Pilot Dry Run ===\n");

    println!("Rate Limiter:");
    println!("  Default delay: {}ms", config.limiter.default_delay_ms);
    println!("  Max retries: {}", config.limiter.max_retries);
    println!(
        "  Backoff: {}ms x{} up to {}ms",
        config.limiter.initial_backoff_ms,
        config.limiter.backoff_multiplier,
        config.limiter.max_backoff_ms
    );
    println!("  Jitter: ±{:.0}%", config.limiter.jitter_factor * 100.0);
    let mut delays: Vec<_> = config.limiter.domain_delays.iter().collect();
    delays.sort();
    for (domain, delay) in delays {
        println!("  - {}: {}ms", domain, delay);
    }

    println!("\nRobots:");
    println!("  Respect robots.txt: {}", config.robots.respect_robots_txt);
    println!("  Cache TTL: {}ms", config.robots.cache_ttl_ms);
    println!("  Scheme: {}", config.robots.scheme);

    println!("\nScheduler:");
    println!(
        "  Max concurrent tasks: {}",
        config.scheduler.max_concurrent_tasks
    );
    println!(
        "  Max tracked sites: {}",
        config.reputation.max_tracked_sites
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nProxies ({}):", config.proxies.list.len());
    for proxy in &config.proxies.list {
        println!("  - {}", proxy);
    }

    println!("\nURLs ({}):", urls.len());
    for url in urls {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --strategy mode: prints the strategy each URL would start with
fn handle_strategy(config: &Config, urls: &[String]) -> anyhow::Result<()> {
    let tracker = Arc::new(SiteReputationTracker::from_config(&config.reputation));
    let engine = AdaptiveStrategyEngine::new(config.strategy.clone(), tracker);

    for url in urls {
        let strategy = engine.strategy_for_url(url);
        println!("# {}", url);
        println!(
            "{}",
            toml::to_string_pretty(&strategy).context("failed to render strategy")?
        );
    }
    Ok(())
}

/// Handles the main fetch run
async fn handle_crawl(config: &Config, urls: &[String], priority: i32) -> anyhow::Result<()> {
    if urls.is_empty() {
        tracing::warn!("No seeds configured and no URLs given; nothing to fetch");
        return Ok(());
    }

    tracing::info!(
        "Fetching {} URLs with up to {} concurrent tasks",
        urls.len(),
        config.scheduler.max_concurrent_tasks
    );

    let crawler = Crawler::from_config(config).context("failed to build crawler")?;
    let report = crawler.fetch_all(urls, priority).await;

    print_report(&report);
    tracing::info!(
        "Run completed: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    Ok(())
}
