use crate::config::types::{
    Config, LimiterConfig, ProxyConfig, ReputationConfig, RobotsConfig, SchedulerConfig,
    StrategyConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_limiter_config(&config.limiter)?;
    validate_robots_config(&config.robots)?;
    validate_reputation_config(&config.reputation)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_strategy_config(&config.strategy)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_proxy_config(&config.proxies)?;
    Ok(())
}

fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS",
                seed
            )));
        }
    }
    Ok(())
}

fn validate_limiter_config(config: &LimiterConfig) -> Result<(), ConfigError> {
    if config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "limiter backoff-multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.max_backoff_ms < config.initial_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "limiter max-backoff-ms ({}) must be >= initial-backoff-ms ({})",
            config.max_backoff_ms, config.initial_backoff_ms
        )));
    }

    if !(0.0..1.0).contains(&config.jitter_factor) {
        return Err(ConfigError::Validation(format!(
            "jitter-factor must be in [0, 1), got {}",
            config.jitter_factor
        )));
    }

    for domain in config.domain_delays.keys() {
        if domain.is_empty() || domain.contains('/') {
            return Err(ConfigError::Validation(format!(
                "domain-delays key '{}' must be a bare host",
                domain
            )));
        }
    }

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.scheme != "http" && config.scheme != "https" {
        return Err(ConfigError::Validation(format!(
            "robots scheme must be 'http' or 'https', got '{}'",
            config.scheme
        )));
    }
    Ok(())
}

fn validate_reputation_config(config: &ReputationConfig) -> Result<(), ConfigError> {
    if config.max_tracked_sites < 1 {
        return Err(ConfigError::Validation(
            "max-tracked-sites must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_tasks < 1 || config.max_concurrent_tasks > 1000 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-tasks must be between 1 and 1000, got {}",
            config.max_concurrent_tasks
        )));
    }
    Ok(())
}

fn validate_strategy_config(config: &StrategyConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "strategy timeout-ms must be > 0".to_string(),
        ));
    }

    if config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "strategy backoff-multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.max_backoff_ms < config.initial_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "strategy max-backoff-ms ({}) must be >= initial-backoff-ms ({})",
            config.max_backoff_ms, config.initial_backoff_ms
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    // The name doubles as the robots.txt agent token
    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    if !config.contact_url.is_empty() {
        Url::parse(&config.contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    for proxy in &config.list {
        let url = Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Proxy '{}' has no host",
                proxy
            )));
        }
    }
    Ok(())
}
