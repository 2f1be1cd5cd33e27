//! Robots.txt parser implementation
//!
//! Line-oriented grammar: `User-agent`, `Allow`, `Disallow`, `Crawl-delay`.
//! `#` starts a comment, directive names are case-insensitive, and
//! directives attach to the most recent `User-agent` group. Consecutive
//! `User-agent` lines form a single group.

use std::collections::HashMap;
use std::time::Duration;

/// Upper bound applied to declared crawl delays (one hour)
const MAX_CRAWL_DELAY_SECS: f64 = 3600.0;

/// Rules declared for one user-agent label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRules {
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    /// Crawl delay in seconds
    pub crawl_delay: Option<f64>,
}

impl AgentRules {
    /// Checks a path against this block
    ///
    /// Allow patterns are consulted first and win on any match; then
    /// Disallow patterns; anything unmatched is allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.allow.iter().any(|p| pattern_matches(p, path)) {
            return true;
        }
        !self.disallow.iter().any(|p| pattern_matches(p, path))
    }
}

/// Parsed robots.txt rules, keyed by lowercase user-agent label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRuleSet {
    groups: HashMap<String, AgentRules>,
}

impl RobotsRuleSet {
    /// Parses raw robots.txt content
    ///
    /// Unknown directives and malformed lines are ignored; an unparseable
    /// file yields an empty, permissive rule set.
    pub fn parse(content: &str) -> Self {
        let mut groups: HashMap<String, AgentRules> = HashMap::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut last_was_agent = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !last_was_agent {
                    current_agents.clear();
                }
                let agent = value.to_lowercase();
                groups.entry(agent.clone()).or_default();
                current_agents.push(agent);
                last_was_agent = true;
                continue;
            }
            last_was_agent = false;

            for agent in &current_agents {
                let Some(rules) = groups.get_mut(agent) else {
                    continue;
                };

                match key.as_str() {
                    "allow" if !value.is_empty() => rules.allow.push(value.to_string()),
                    // An empty Disallow means "nothing is disallowed"
                    "disallow" if !value.is_empty() => rules.disallow.push(value.to_string()),
                    "crawl-delay" => {
                        if let Some(delay) = value
                            .parse::<f64>()
                            .ok()
                            .filter(|d| d.is_finite() && *d >= 0.0)
                        {
                            rules.crawl_delay = Some(delay.min(MAX_CRAWL_DELAY_SECS));
                        }
                    }
                    _ => {}
                }
            }
        }

        Self { groups }
    }

    /// An empty rule set that allows everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Resolves the block that applies to `user_agent`
    ///
    /// Resolution order: exact case-insensitive label match, then a label
    /// contained in the agent string (the longest one wins), then `*`.
    pub fn rules_for(&self, user_agent: &str) -> Option<&AgentRules> {
        let agent = user_agent.to_lowercase();

        if let Some(rules) = self.groups.get(&agent) {
            return Some(rules);
        }

        let contained = self
            .groups
            .iter()
            .filter(|(label, _)| label.as_str() != "*" && !label.is_empty())
            .filter(|(label, _)| agent.contains(label.as_str()))
            .max_by_key(|(label, _)| label.len())
            .map(|(_, rules)| rules);

        contained.or_else(|| self.groups.get("*"))
    }

    /// Checks if a path is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `path` - The URL path to check (e.g., "/page.html")
    /// * `user_agent` - The user agent string
    pub fn is_allowed(&self, path: &str, user_agent: &str) -> bool {
        self.rules_for(user_agent)
            .map_or(true, |rules| rules.is_allowed(path))
    }

    /// Gets the crawl delay for a specific user agent
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.rules_for(user_agent)
            .and_then(|rules| rules.crawl_delay)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Matches a single robots pattern against a path
///
/// - `/private*` matches anything starting with `/private`
/// - `/private/` matches that directory and everything below it
/// - `/private` matches itself and everything below `/private/`
fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }

    if pattern.ends_with('/') {
        return path.starts_with(pattern);
    }

    match path.strip_prefix(pattern) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
