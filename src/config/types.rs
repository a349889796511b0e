use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a harvest run
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Records fetched before this instant are stale and eligible for refetch
    #[serde(default, deserialize_with = "deserialize_since")]
    pub since: Option<DateTime<Utc>>,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default, rename = "api-samples")]
    pub api_samples: ApiSampleConfig,

    pub output: OutputConfig,
}

impl Config {
    /// Creates a configuration with every option at its default, writing under `root`
    pub fn with_output_root(root: impl Into<PathBuf>) -> Self {
        Self {
            since: None,
            crawl: CrawlConfig::default(),
            fetch: FetchConfig::default(),
            scope: ScopeConfig::default(),
            bulk: BulkConfig::default(),
            api_samples: ApiSampleConfig::default(),
            output: OutputConfig { root: root.into() },
        }
    }
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Seed URLs, enqueued at depth 0
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Maximum number of HTML pages recorded per run
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum number of attachments recorded per run
    #[serde(
        rename = "max-attachments",
        alias = "max-files",
        default = "default_max_attachments"
    )]
    pub max_attachments: usize,

    /// Maximum link depth from a seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of concurrent fetch workers across all hosts
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Number of concurrent fetches allowed against one host
    #[serde(rename = "per-host-workers", default = "default_per_host_workers")]
    pub per_host_workers: usize,

    /// Path suffixes that mark a URL as an attachment
    #[serde(
        rename = "attachment-extensions",
        default = "default_attachment_extensions"
    )]
    pub attachment_extensions: Vec<String>,

    /// Number of manifest updates between periodic flushes
    #[serde(rename = "flush-every", default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_pages: default_max_pages(),
            max_attachments: default_max_attachments(),
            max_depth: default_max_depth(),
            workers: default_workers(),
            per_host_workers: default_per_host_workers(),
            attachment_extensions: default_attachment_extensions(),
            flush_every: default_flush_every(),
        }
    }
}

/// HTTP client behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header sent with every request and matched against robots.txt
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Maximum attempts per request (values below 1 are treated as 1)
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds
    #[serde(rename = "backoff-factor", default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Ceiling on a single backoff delay, in seconds
    #[serde(rename = "backoff-max-seconds", default)]
    pub backoff_max_seconds: Option<f64>,

    /// Minimum interval between requests to the same host, in seconds
    #[serde(rename = "throttle-seconds", default)]
    pub throttle_seconds: f64,
}

impl FetchConfig {
    /// Number of attempts a request gets before it is given up on
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Ceiling on a single backoff delay
    ///
    /// Defaults to `backoff_factor * max_attempts` when not configured.
    pub fn backoff_cap(&self) -> Duration {
        let seconds = self
            .backoff_max_seconds
            .unwrap_or(self.backoff_factor * f64::from(self.max_attempts()));
        seconds_to_duration(seconds)
    }

    /// Configured politeness interval
    pub fn throttle(&self) -> Duration {
        seconds_to_duration(self.throttle_seconds)
    }
}

/// Negative and NaN become zero; values too large for a `Duration` saturate
fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            backoff_max_seconds: None,
            throttle_seconds: 0.0,
        }
    }
}

/// Host allow/deny lists for the crawl phase
///
/// Entries are exact hosts (`example.com`) or wildcard patterns
/// (`*.example.com`). An empty allow list restricts the crawl to the
/// hosts of the seed URLs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeConfig {
    #[serde(rename = "allow-hosts", default)]
    pub allow_hosts: Vec<String>,

    #[serde(rename = "deny-hosts", default)]
    pub deny_hosts: Vec<String>,
}

/// Bulk artifact downloads
#[derive(Debug, Clone, Deserialize)]
pub struct BulkConfig {
    /// Artifact URLs, downloaded in order
    #[serde(default)]
    pub urls: Vec<String>,

    /// Maximum number of artifacts downloaded per run
    #[serde(rename = "max-bulk", default = "default_max_bulk")]
    pub max_bulk: usize,

    /// Maximum cumulative bytes downloaded per run
    #[serde(rename = "max-bulk-bytes", default = "default_max_bulk_bytes")]
    pub max_bulk_bytes: u64,

    /// Empty means any host
    #[serde(rename = "allow-hosts", default)]
    pub allow_hosts: Vec<String>,

    #[serde(rename = "deny-hosts", default)]
    pub deny_hosts: Vec<String>,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            max_bulk: default_max_bulk(),
            max_bulk_bytes: default_max_bulk_bytes(),
            allow_hosts: Vec::new(),
            deny_hosts: Vec::new(),
        }
    }
}

/// Sampled API responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSampleConfig {
    #[serde(default)]
    pub urls: Vec<String>,

    /// Maximum number of distinct endpoints sampled per run
    #[serde(default = "default_api_limit")]
    pub limit: usize,
}

impl Default for ApiSampleConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            limit: default_api_limit(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding content, manifests and logs
    pub root: PathBuf,
}

fn default_max_pages() -> usize {
    200
}

fn default_max_attachments() -> usize {
    200
}

fn default_max_depth() -> u32 {
    4
}

fn default_workers() -> usize {
    4
}

fn default_per_host_workers() -> usize {
    1
}

fn default_attachment_extensions() -> Vec<String> {
    [".pdf", ".json", ".yaml", ".yml", ".zip", ".csv", ".xml"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_flush_every() -> usize {
    25
}

fn default_user_agent() -> String {
    format!("harvest-engine/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    0.5
}

fn default_max_bulk() -> usize {
    50
}

fn default_max_bulk_bytes() -> u64 {
    10_000_000_000
}

fn default_api_limit() -> usize {
    20
}

fn deserialize_since<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| super::parse_timestamp(&value).map_err(serde::de::Error::custom))
        .transpose()
}
