//! Output module for run-level reports
//!
//! This module handles:
//! - The run summary (`run_summary.json` and the printed report)
//! - The combined run manifest across crawl, bulk and API sample sections

mod run_manifest;
mod summary;

pub use run_manifest::{
    write_run_manifest, RunManifestEntry, RunManifestSummary, RUN_MANIFEST, RUN_MANIFEST_SUMMARY,
};
pub use summary::{print_summary, HarvestSummary, RUN_SUMMARY};
