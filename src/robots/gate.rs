//! Robots compliance gate
//!
//! Holds one [`RobotsPolicy`] per host key for the lifetime of a run. The
//! first query for a host fetches its robots.txt through the fetch client;
//! every later query is answered from the cache.

use super::policy::RobotsPolicy;
use crate::crawler::{FetchClient, OutcomeKind};
use crate::storage::{DisallowedEntry, StorageResult, WriterHandle};
use crate::url::{host_key, host_name};
use std::collections::HashMap;
use url::Url;

#[derive(Debug)]
pub struct RobotsGate {
    user_agent: String,
    client: FetchClient,
    writer: WriterHandle,
    policies: HashMap<String, RobotsPolicy>,
}

impl RobotsGate {
    pub fn new(user_agent: impl Into<String>, client: FetchClient, writer: WriterHandle) -> Self {
        Self {
            user_agent: user_agent.into(),
            client,
            writer,
            policies: HashMap::new(),
        }
    }

    /// Decides whether `url` may be fetched
    ///
    /// A denial is appended to `disallowed.jsonl` before returning. Only a
    /// failure to write that log is an error.
    pub async fn allows(&mut self, url: &Url) -> StorageResult<bool> {
        let Some(host) = host_key(url) else {
            return Ok(true);
        };

        let allowed = self.policy(url, &host).await.allows(url.as_str());
        if !allowed {
            tracing::info!(url = %url, host = %host, "Disallowed by robots.txt");
            self.writer
                .log_disallowed(DisallowedEntry::robots(
                    url.as_str(),
                    host_name(url).unwrap_or_default(),
                ))
                .await?;
        }
        Ok(allowed)
    }

    /// Crawl delay of a host whose policy is already cached
    pub fn crawl_delay(&self, host: &str) -> Option<f64> {
        self.policies.get(host).and_then(|p| p.crawl_delay)
    }

    /// Cached policy of a host, if it has been queried
    pub fn cached(&self, host: &str) -> Option<&RobotsPolicy> {
        self.policies.get(host)
    }

    pub fn cached_hosts(&self) -> usize {
        self.policies.len()
    }

    async fn policy(&mut self, url: &Url, host: &str) -> &RobotsPolicy {
        if !self.policies.contains_key(host) {
            let policy = self.fetch_policy(url, host).await;
            self.policies.insert(host.to_string(), policy);
        }
        &self.policies[host]
    }

    /// Fetches and parses robots.txt for `host`
    ///
    /// Anything other than a successful response yields an allow-all policy:
    /// an unreachable robots.txt must not block a reachable host.
    async fn fetch_policy(&self, url: &Url, host: &str) -> RobotsPolicy {
        let robots_url = match Url::parse(&format!("{}://{}/robots.txt", url.scheme(), host)) {
            Ok(robots_url) => robots_url,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Cannot build robots.txt URL, allowing all");
                return RobotsPolicy::allow_all(host);
            }
        };

        let outcome = self.client.fetch(&robots_url, None).await;
        match (outcome.kind, outcome.body) {
            (OutcomeKind::Success, Some(body)) => {
                let content = String::from_utf8_lossy(&body);
                let policy = RobotsPolicy::parse(host, &content, &self.user_agent);
                tracing::debug!(
                    host = %host,
                    disallow = policy.disallow_rules.len(),
                    allow = policy.allow_rules.len(),
                    crawl_delay = ?policy.crawl_delay,
                    sitemaps = policy.sitemaps.len(),
                    "Loaded robots.txt"
                );
                policy
            }
            (kind, _) => {
                tracing::warn!(
                    host = %host,
                    url = %robots_url,
                    status = outcome.status_code,
                    outcome = ?kind,
                    "robots.txt unavailable, allowing all"
                );
                RobotsPolicy::allow_all(host)
            }
        }
    }
}
