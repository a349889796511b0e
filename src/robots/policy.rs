//! Parsed robots.txt policy for one host
//!
//! Allow/deny decisions go through the robotstxt crate's matcher; the rule
//! lists, `Crawl-delay` and `Sitemap` entries are extracted here for the
//! politeness scheduler and for reporting.

use chrono::{DateTime, Utc};
use robotstxt::DefaultMatcher;

/// Longest `Crawl-delay` honored, in seconds; larger values are clamped
pub const MAX_CRAWL_DELAY_SECS: f64 = 3600.0;

/// Robots policy of a single host, built once per run and never mutated
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    pub host: String,
    /// Raw robots.txt content (empty means allow all)
    content: String,
    /// Product token matched against `User-agent` lines
    agent: String,
    pub disallow_rules: Vec<String>,
    pub allow_rules: Vec<String>,
    /// Seconds between requests, if the host asks for one
    pub crawl_delay: Option<f64>,
    pub sitemaps: Vec<String>,
    pub can_fetch_root: bool,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<f64>,
    has_rules: bool,
}

/// Reduces a full user-agent string to its product token
///
/// `harvest-engine/0.1 (+https://example.com)` becomes `harvest-engine`.
pub fn product_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

impl RobotsPolicy {
    /// Parses robots.txt content for `user_agent`
    ///
    /// Rules come from the groups naming the agent; when none do, from the
    /// `*` groups.
    pub fn parse(host: impl Into<String>, content: &str, user_agent: &str) -> Self {
        let agent = product_token(user_agent);
        let (groups, sitemaps) = parse_groups(content);
        let normalized = agent.to_lowercase();

        let specific: Vec<&Group> = groups
            .iter()
            .filter(|g| {
                g.agents
                    .iter()
                    .any(|a| a != "*" && !normalized.is_empty() && normalized.contains(a.as_str()))
            })
            .collect();
        let selected: Vec<&Group> = if specific.is_empty() {
            groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .collect()
        } else {
            specific
        };

        let mut policy = Self {
            host: host.into(),
            content: content.to_string(),
            agent,
            disallow_rules: selected.iter().flat_map(|g| g.disallow.clone()).collect(),
            allow_rules: selected.iter().flat_map(|g| g.allow.clone()).collect(),
            crawl_delay: selected.iter().find_map(|g| g.crawl_delay),
            sitemaps,
            can_fetch_root: true,
            fetched_at: Utc::now(),
        };
        policy.can_fetch_root = policy.allows_path("/");
        policy
    }

    /// A policy that allows everything, used when robots.txt is unavailable
    pub fn allow_all(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            content: String::new(),
            agent: String::new(),
            disallow_rules: Vec::new(),
            allow_rules: Vec::new(),
            crawl_delay: None,
            sitemaps: Vec::new(),
            can_fetch_root: true,
            fetched_at: Utc::now(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks whether a URL (or a bare path) may be fetched
    pub fn allows(&self, url: &str) -> bool {
        if self.content.trim().is_empty() || self.agent.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, &self.agent, url)
    }

    fn allows_path(&self, path: &str) -> bool {
        let candidate = format!("http://{}{}", self.host, path);
        self.allows(&candidate)
    }
}

fn parse_groups(content: &str) -> (Vec<Group>, Vec<String>) {
    let mut groups = Vec::new();
    let mut sitemaps = Vec::new();
    let mut current = Group::default();

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
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                // A user-agent after rules starts a new group; consecutive
                // user-agent lines share one.
                if current.has_rules {
                    groups.push(std::mem::take(&mut current));
                }
                current.agents.push(value.to_lowercase());
            }
            "disallow" if !current.agents.is_empty() => {
                current.has_rules = true;
                if !value.is_empty() {
                    current.disallow.push(value.to_string());
                }
            }
            "allow" if !current.agents.is_empty() => {
                current.has_rules = true;
                if !value.is_empty() {
                    current.allow.push(value.to_string());
                }
            }
            "crawl-delay" if !current.agents.is_empty() => {
                current.has_rules = true;
                if let Ok(delay) = value.parse::<f64>() {
                    if delay.is_finite() && delay >= 0.0 {
                        current.crawl_delay = Some(delay.min(MAX_CRAWL_DELAY_SECS));
                    }
                }
            }
            "sitemap" => sitemaps.push(value.to_string()),
            _ => {}
        }
    }

    if !current.agents.is_empty() {
        groups.push(current);
    }
    (groups, sitemaps)
}
