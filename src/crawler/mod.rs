//! Crawler module for fetching and processing
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with conditional requests and retry logic
//! - HTML link extraction
//! - Per-host politeness scheduling
//! - The crawl loop, the bulk phase and the API sample phase

mod api_samples;
mod bulk;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod scheduler;
mod sleeper;

pub use api_samples::run_api_samples;
pub use bulk::run_bulk;
pub use coordinator::Coordinator;
pub use fetcher::{
    build_http_client, parse_retry_after, ErrorKind, FetchClient, FetchError, FetchOutcome,
    OutcomeKind, RetryPolicy,
};
pub use frontier::{CrawlTarget, EnqueueResult, Frontier};
pub use parser::extract_links;
pub use scheduler::{HostScheduler, Slot};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};

use crate::config::Config;
use crate::output::{write_run_manifest, HarvestSummary};
use crate::robots::RobotsGate;
use crate::state::TargetState;
use crate::storage::{
    reason, spawn_writer, FailureEntry, FetchRecord, HarvestStore, Section, SkipEntry,
    WriterHandle,
};
use crate::url::host_name;
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

/// Everything a phase needs to fetch and record
#[derive(Debug)]
pub struct HarvestContext {
    pub config: Arc<Config>,
    pub client: FetchClient,
    pub writer: WriterHandle,
    pub robots: RobotsGate,
    /// Per-host spacing shared by every phase of the run
    pub scheduler: HostScheduler,
    /// Records fetched before this instant are refetched
    pub since: Option<DateTime<Utc>>,
}

impl HarvestContext {
    /// Settles a target that was never requested and logs why
    pub(crate) async fn skip(
        &self,
        section: Section,
        url: &Url,
        why: &str,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let settled = TargetState::Queued.transition(TargetState::Skipped)?;
        tracing::debug!(url = %url, reason = why, state = settled.as_str(), "Skipping");
        summary.record_skip(why);
        let entry = SkipEntry::new(url.as_str(), host_name(url).unwrap_or_default(), why);
        self.writer.log_skip(section, entry).await?;
        Ok(())
    }

    /// Reserves the next request slot of `host` and sleeps until it opens
    async fn wait_turn(&mut self, host: &str) {
        let crawl_delay = self.robots.crawl_delay(host);
        self.scheduler.set_crawl_delay(host, crawl_delay);
        let wait = self.scheduler.reserve(host).wait();
        if !wait.is_zero() {
            self.client.sleeper().sleep(wait).await;
        }
    }

    /// GET in turn with every other request to the same host
    ///
    /// Used by the sequential phases; the crawl loop reserves slots itself
    /// since its fetches run concurrently.
    pub(crate) async fn polite_fetch(
        &mut self,
        url: &Url,
        host: &str,
        prior: Option<&FetchRecord>,
    ) -> FetchOutcome {
        self.wait_turn(host).await;
        let outcome = self.client.fetch(url, prior).await;
        self.scheduler.release(host);
        outcome
    }

    /// HEAD in turn with every other request to the same host
    pub(crate) async fn polite_head(
        &mut self,
        url: &Url,
        host: &str,
        prior: Option<&FetchRecord>,
    ) -> FetchOutcome {
        self.wait_turn(host).await;
        let outcome = self.client.head(url, prior).await;
        self.scheduler.release(host);
        outcome
    }
}

/// State a fetch outcome leaves a target in, walked from `Queued`
pub(crate) fn outcome_state(outcome: &FetchOutcome) -> Result<TargetState> {
    let fetching = TargetState::Queued.transition(TargetState::Fetching)?;
    match outcome.kind {
        OutcomeKind::Success => fetching.transition(TargetState::Success),
        OutcomeKind::NotModified => fetching.transition(TargetState::NotModified),
        OutcomeKind::ClientError => fetching.transition(TargetState::TerminalFailure),
        OutcomeKind::RetryableFailure => fetching
            .transition(TargetState::RetryableFailure)?
            .transition(TargetState::TerminalFailure),
    }
}

/// Failure log entry for an outcome that produced no body
pub(crate) fn failure_entry(outcome: &FetchOutcome) -> FailureEntry {
    let reason = match outcome.kind {
        OutcomeKind::ClientError => reason::HTTP_ERROR,
        _ => reason::REQUEST_FAILED,
    };
    let error = outcome.error_message();
    tracing::warn!(
        url = %outcome.url,
        status = ?outcome.status_code,
        attempts = outcome.attempts,
        error = ?error,
        "Fetch failed"
    );
    let host = host_name(&outcome.url).unwrap_or_default();
    let mut entry = FailureEntry::new(outcome.url.as_str(), host, reason);
    entry.status_code = outcome.status_code;
    entry.error = error;
    entry.attempts = Some(outcome.attempts);
    entry
}

/// Runs a complete harvest: crawl, bulk downloads, then API samples
///
/// # Example
///
/// ```no_run
/// use harvest_engine::{Config, Harvester};
///
/// # async fn run() -> harvest_engine::Result<()> {
/// let mut config = Config::with_output_root("out");
/// config.crawl.seeds = vec!["https://example.com/".to_string()];
/// let summary = Harvester::new(config)?.run().await?;
/// println!("fetched {}", summary.fetched);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Harvester {
    config: Arc<Config>,
    client: FetchClient,
    config_hash: Option<String>,
}

impl Harvester {
    /// Validates `config` and builds the HTTP client
    pub fn new(config: Config) -> Result<Self> {
        crate::config::validate(&config)?;
        let client = FetchClient::new(&config.fetch)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            config_hash: None,
        })
    }

    /// Replaces the sleeper used for backoff and politeness waits
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.client = self.client.with_sleeper(sleeper);
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(self) -> Result<HarvestSummary> {
        let mut summary = HarvestSummary::new();
        summary.config_hash = self.config_hash.clone();

        let root = self.config.output.root.clone();
        tracing::info!(root = %root.display(), since = ?self.config.since, "Opening output root");
        let store = HarvestStore::open(root.clone(), self.config.crawl.flush_every)?;
        let (writer, writer_task) = spawn_writer(store);

        let robots = RobotsGate::new(
            self.config.fetch.user_agent.clone(),
            self.client.clone(),
            writer.clone(),
        );
        let scheduler = HostScheduler::new(
            self.config.crawl.per_host_workers,
            self.config.fetch.throttle(),
        );
        let mut ctx = HarvestContext {
            since: self.config.since,
            config: Arc::clone(&self.config),
            client: self.client,
            writer,
            robots,
            scheduler,
        };

        Coordinator::new(&mut ctx).run(&mut summary).await?;
        ctx.writer.flush().await?;

        run_bulk(&mut ctx, &mut summary).await?;
        ctx.writer.flush().await?;

        run_api_samples(&mut ctx, &mut summary).await?;
        ctx.writer.flush().await?;

        let mut sections = Vec::with_capacity(Section::ALL.len());
        for section in Section::ALL {
            sections.push((section, ctx.writer.records(section).await?));
        }
        write_run_manifest(&root, &sections)?;

        tracing::info!(
            hosts = ctx.robots.cached_hosts(),
            requests = ctx.scheduler.total_requests(),
            "Robots policies consulted"
        );
        drop(ctx);
        writer_task.await??;

        summary.finish();
        summary.write(&root)?;
        tracing::info!(
            fetched = summary.fetched,
            not_modified = summary.not_modified,
            skipped = summary.total_skipped(),
            failed = summary.total_failed(),
            "Harvest finished"
        );
        Ok(summary)
    }
}

/// Runs a harvest with default settings for everything but the config
pub async fn harvest(config: Config) -> Result<HarvestSummary> {
    Harvester::new(config)?.run().await
}
