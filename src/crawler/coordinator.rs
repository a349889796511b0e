//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop, which:
//! - Drains the frontier in FIFO order, skipping targets whose budget class
//!   is full or whose host has no free slot
//! - Skips targets with a fresh manifest record
//! - Consults the robots gate before any request
//! - Runs up to `workers` fetches concurrently, spaced per host
//! - Hands every body to the writer task and re-enqueues discovered links

use super::fetcher::{FetchOutcome, OutcomeKind};
use super::frontier::{CrawlTarget, EnqueueResult, Frontier};
use super::parser::extract_links;
use super::{failure_entry, outcome_state, HarvestContext};
use crate::output::HarvestSummary;
use crate::state::{CrawlBudget, TargetState};
use crate::storage::{reason, ContentArea, RecordDraft, Section};
use crate::url::{host_key, ScopePolicy, TargetKind};
use crate::Result;
use std::time::Instant;
use tokio::task::JoinSet;
use url::Url;

/// Result of one worker's fetch, returned to the coordinator
#[derive(Debug)]
struct TaskReport {
    target: CrawlTarget,
    host: String,
    outcome: FetchOutcome,
}

/// Main crawl loop state
pub struct Coordinator<'a> {
    ctx: &'a mut HarvestContext,
    frontier: Frontier,
    budget: CrawlBudget,
    completed: u64,
}

impl<'a> Coordinator<'a> {
    /// Builds the coordinator and seeds the frontier
    ///
    /// Seeds that fail to canonicalize are logged and dropped.
    pub fn new(ctx: &'a mut HarvestContext) -> Self {
        let crawl = &ctx.config.crawl;

        let seeds: Vec<Url> = crawl
            .seeds
            .iter()
            .filter_map(|raw| match crate::url::canonicalize(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(seed = %raw, error = %e, "Ignoring invalid seed");
                    None
                }
            })
            .collect();

        let scope = ScopePolicy::for_crawl(
            &ctx.config.scope.allow_hosts,
            &ctx.config.scope.deny_hosts,
            &seeds,
        );
        let mut frontier = Frontier::new(
            scope,
            crawl.max_depth,
            crawl.attachment_extensions.clone(),
        );
        for seed in &seeds {
            if frontier.enqueue(seed.as_str(), 0) != EnqueueResult::Queued {
                tracing::debug!(seed = %seed, "Seed not queued");
            }
        }

        let budget = CrawlBudget::new(crawl.max_pages, crawl.max_attachments);

        Self {
            ctx,
            frontier,
            budget,
            completed: 0,
        }
    }

    /// Runs the crawl until the frontier or the budgets are exhausted
    pub async fn run(&mut self, summary: &mut HarvestSummary) -> Result<()> {
        let workers = self.ctx.config.crawl.workers.max(1);
        let start_time = Instant::now();
        let mut tasks: JoinSet<TaskReport> = JoinSet::new();

        tracing::info!(
            seeds = self.frontier.len(),
            workers,
            max_pages = self.ctx.config.crawl.max_pages,
            max_attachments = self.ctx.config.crawl.max_attachments,
            "Starting crawl"
        );

        loop {
            while tasks.len() < workers {
                let Some(target) = self.next_eligible() else {
                    break;
                };
                self.dispatch(target, &mut tasks, summary).await?;
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let report = joined?;
            self.handle_report(report, summary).await?;

            self.completed += 1;
            if self.completed % 10 == 0 {
                let elapsed = start_time.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "Progress: {} fetches completed, {} in frontier, {:.2} fetches/sec",
                    self.completed,
                    self.frontier.len(),
                    self.completed as f64 / elapsed
                );
            }
        }

        let remaining = self.frontier.len() as u64;
        summary.frontier_remaining = remaining;
        while let Some(target) = self.frontier.dequeue() {
            self.ctx
                .skip(Section::Crawl, &target.url, reason::BUDGET, summary)
                .await?;
        }

        tracing::info!(
            fetches = self.completed,
            pages = self.budget.consumed(TargetKind::Page),
            attachments = self.budget.consumed(TargetKind::Attachment),
            frontier_remaining = remaining,
            "Crawl completed in {:?}",
            start_time.elapsed()
        );
        Ok(())
    }

    /// Oldest queued target whose budget class has room and whose host can
    /// take another request
    fn next_eligible(&mut self) -> Option<CrawlTarget> {
        let budget = &self.budget;
        let scheduler = &self.ctx.scheduler;
        self.frontier.dequeue_where(|target| {
            budget.has_room(target.kind)
                && host_key(&target.url).map_or(true, |host| scheduler.can_dispatch(&host))
        })
    }

    /// Runs the pre-fetch checks and spawns a worker for `target`
    async fn dispatch(
        &mut self,
        target: CrawlTarget,
        tasks: &mut JoinSet<TaskReport>,
        summary: &mut HarvestSummary,
    ) -> Result<()> {
        let Some(host) = host_key(&target.url) else {
            return Ok(());
        };

        let prior = self
            .ctx
            .writer
            .lookup(Section::Crawl, target.url.as_str())
            .await?;
        if let Some(record) = &prior {
            if !record.is_stale(self.ctx.since) {
                return self
                    .ctx
                    .skip(Section::Crawl, &target.url, reason::FRESH, summary)
                    .await;
            }
        }

        if !self.ctx.robots.allows(&target.url).await? {
            TargetState::Queued
                .transition(TargetState::RobotsDenied)?
                .settle()?;
            summary.record_skip(reason::ROBOTS);
            return Ok(());
        }
        let crawl_delay = self.ctx.robots.crawl_delay(&host);
        self.ctx.scheduler.set_crawl_delay(&host, crawl_delay);

        if !self.budget.reserve(target.kind) {
            return self
                .ctx
                .skip(Section::Crawl, &target.url, reason::BUDGET, summary)
                .await;
        }
        let slot = self.ctx.scheduler.reserve(&host);

        let client = self.ctx.client.clone();
        let sleeper = client.sleeper();
        tracing::debug!(url = %target.url, depth = target.depth, kind = target.kind.as_str(), "Dispatching");

        tasks.spawn(async move {
            let wait = slot.wait();
            if !wait.is_zero() {
                sleeper.sleep(wait).await;
            }
            let outcome = client.fetch(&target.url, prior.as_ref()).await;
            TaskReport {
                target,
                host,
                outcome,
            }
        });
        Ok(())
    }

    async fn handle_report(&mut self, report: TaskReport, summary: &mut HarvestSummary) -> Result<()> {
        let TaskReport {
            target,
            host,
            mut outcome,
        } = report;
        self.ctx.scheduler.release(&host);
        let state = outcome_state(&outcome)?;

        match outcome.kind {
            OutcomeKind::Success => {
                let body = outcome.body.take().unwrap_or_default();
                let is_html = looks_like_html(outcome.content_type.as_deref(), &body);
                let links = if is_html {
                    extract_links(&String::from_utf8_lossy(&body), &target.url)
                } else {
                    Vec::new()
                };

                let draft = RecordDraft {
                    url: target.url.clone(),
                    status_code: outcome.status_code.unwrap_or(200),
                    content_type: outcome.content_type.clone(),
                    etag: outcome.etag.clone(),
                    last_modified: outcome.last_modified.clone(),
                    content_length: outcome.content_length,
                    depth: target.depth,
                    is_html,
                    area: if is_html {
                        ContentArea::Html
                    } else {
                        ContentArea::Assets
                    },
                    is_bulk_artifact: false,
                    is_api_sample: false,
                };
                let record = self.ctx.writer.record(Section::Crawl, draft, body).await?;

                self.budget.consume(target.kind);
                summary.fetched += 1;
                if record.deduped_by_hash {
                    summary.deduped += 1;
                }
                if is_html {
                    summary.pages += 1;
                } else {
                    summary.attachments += 1;
                }
                tracing::debug!(
                    url = %target.url,
                    path = %record.local_path,
                    deduped = record.deduped_by_hash,
                    "Recorded"
                );
                self.enqueue_links(&links, target.depth);
            }
            OutcomeKind::NotModified => {
                let touched = self
                    .ctx
                    .writer
                    .touch(Section::Crawl, target.url.as_str())
                    .await?;
                self.budget.consume(target.kind);
                summary.not_modified += 1;
                tracing::debug!(url = %target.url, "Not modified");

                if let Some(record) = touched.filter(|r| r.is_html) {
                    let links = self.cached_links(&record.local_path, &target.url).await;
                    self.enqueue_links(&links, target.depth);
                }
            }
            OutcomeKind::ClientError | OutcomeKind::RetryableFailure => {
                self.budget.release(target.kind);
                let entry = failure_entry(&outcome);
                summary.record_failure(&entry.reason);
                self.ctx.writer.log_failure(Section::Crawl, entry).await?;
            }
        }

        let settled = state.settle()?;
        tracing::trace!(url = %target.url, outcome = state.as_str(), settled = settled.as_str(), "Target settled");
        Ok(())
    }

    fn enqueue_links(&mut self, links: &[String], depth: u32) {
        let mut queued = 0;
        for link in links {
            if self.frontier.enqueue(link, depth + 1) == EnqueueResult::Queued {
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::debug!(discovered = links.len(), queued, "Enqueued links");
        }
    }

    /// Links of an unchanged page, read back from the content store
    async fn cached_links(&self, local_path: &str, page_url: &Url) -> Vec<String> {
        let path = self.ctx.writer.root().join(local_path);
        match tokio::fs::read(&path).await {
            Ok(body) => extract_links(&String::from_utf8_lossy(&body), page_url),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cached body unreadable, no links followed");
                Vec::new()
            }
        }
    }
}

/// HTML if the content type says so, or, lacking one, if the body opens with a tag
pub(crate) fn looks_like_html(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type {
        Some(ct) if !ct.trim().is_empty() => ct.to_ascii_lowercase().contains("html"),
        _ => body
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .map_or(false, |b| *b == b'<'),
    }
}
