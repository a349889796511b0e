//! Run summary
//!
//! Counts of what a run fetched, reused, skipped and failed, printed at the
//! end of a run and written to `run_summary.json`.

use crate::storage::{write_atomic, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const RUN_SUMMARY: &str = "run_summary.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    /// SHA-256 of the config file the run was started with
    pub config_hash: Option<String>,

    /// Bodies downloaded (including ones whose bytes were already stored)
    pub fetched: u64,
    /// Downloads whose bytes were already in the content store
    pub deduped: u64,
    /// Conditional requests answered with "not modified"
    pub not_modified: u64,
    /// Targets not fetched, by reason
    pub skipped: BTreeMap<String, u64>,
    /// Targets that failed terminally, by reason
    pub failed: BTreeMap<String, u64>,

    pub pages: u64,
    pub attachments: u64,
    pub bulk_artifacts: u64,
    pub bulk_bytes: u64,
    pub api_samples: u64,
    /// Crawl targets still queued when the crawl stopped
    pub frontier_remaining: u64,
}

impl HarvestSummary {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn record_skip(&mut self, reason: &str) {
        *self.skipped.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, reason: &str) {
        *self.failed.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn skipped_for(&self, reason: &str) -> u64 {
        self.skipped.get(reason).copied().unwrap_or(0)
    }

    pub fn failed_for(&self, reason: &str) -> u64 {
        self.failed.get(reason).copied().unwrap_or(0)
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.failed.values().sum()
    }

    /// Stamps the finish time and duration
    pub fn finish(&mut self) {
        let finished = Utc::now();
        if let Some(started) = self.started_at {
            let elapsed = (finished - started).num_milliseconds().max(0);
            self.duration_seconds = Some(elapsed as f64 / 1000.0);
        }
        self.finished_at = Some(finished);
    }

    /// Writes `run_summary.json` under `root`
    pub fn write(&self, root: &Path) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&root.join(RUN_SUMMARY), &json)
    }
}

/// Prints the summary to stdout in a formatted manner
pub fn print_summary(summary: &HarvestSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Overview:");
    println!("  Fetched: {}", summary.fetched);
    println!("  Deduplicated: {}", summary.deduped);
    println!("  Not modified: {}", summary.not_modified);
    println!("  Skipped: {}", summary.total_skipped());
    println!("  Failed: {}", summary.total_failed());
    println!();

    println!("Records:");
    println!("  Pages: {}", summary.pages);
    println!("  Attachments: {}", summary.attachments);
    println!(
        "  Bulk artifacts: {} ({} bytes)",
        summary.bulk_artifacts, summary.bulk_bytes
    );
    println!("  API samples: {}", summary.api_samples);
    if summary.frontier_remaining > 0 {
        println!("  Left in frontier: {}", summary.frontier_remaining);
    }
    println!();

    if !summary.skipped.is_empty() {
        println!("Skipped by Reason:");
        for (reason, count) in &summary.skipped {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if !summary.failed.is_empty() {
        println!("Failed by Reason:");
        for (reason, count) in &summary.failed {
            println!("  {}: {}", reason, count);
        }
        println!();
    }

    if let Some(duration) = summary.duration_seconds {
        println!("Completed in {:.1}s", duration);
    }
}
