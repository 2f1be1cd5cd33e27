//! Configuration module for Crawl-Pilot
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! # Example
//!
//! ```no_run
//! use crawl_pilot::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Default delay: {}ms", config.limiter.default_delay_ms);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, LimiterConfig, ProxyConfig, ReputationConfig, RobotsConfig, SchedulerConfig,
    StrategyConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
