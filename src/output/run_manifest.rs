//! Combined run manifest
//!
//! After every phase has finished, the three section manifests are merged
//! into `run_manifest.jsonl`, each record tagged with the section it came
//! from, plus a `run_manifest_summary.json` with per-section counts.

use crate::storage::{write_atomic, FetchRecord, Section, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const RUN_MANIFEST: &str = "run_manifest.jsonl";
pub const RUN_MANIFEST_SUMMARY: &str = "run_manifest_summary.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifestEntry {
    /// `crawl`, `bulk` or `api_samples`
    pub origin: String,
    #[serde(flatten)]
    pub record: FetchRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifestSummary {
    pub pages: usize,
    pub assets: usize,
    pub bulk_artifacts: usize,
    pub api_samples: usize,
    pub total: usize,
    pub generated_at: DateTime<Utc>,
}

/// Writes the run manifest and its summary under `root`
pub fn write_run_manifest(
    root: &Path,
    sections: &[(Section, Vec<FetchRecord>)],
) -> StorageResult<RunManifestSummary> {
    let mut lines = Vec::new();
    let mut summary = RunManifestSummary {
        pages: 0,
        assets: 0,
        bulk_artifacts: 0,
        api_samples: 0,
        total: 0,
        generated_at: Utc::now(),
    };

    for (section, records) in sections {
        for record in records {
            match section {
                Section::Crawl if record.is_html => summary.pages += 1,
                Section::Crawl => summary.assets += 1,
                Section::Bulk => summary.bulk_artifacts += 1,
                Section::ApiSamples => summary.api_samples += 1,
            }
            let entry = RunManifestEntry {
                origin: section.origin().to_string(),
                record: record.clone(),
            };
            serde_json::to_writer(&mut lines, &entry)?;
            lines.push(b'\n');
        }
    }
    summary.total = summary.pages + summary.assets + summary.bulk_artifacts + summary.api_samples;

    write_atomic(&root.join(RUN_MANIFEST), &lines)?;
    write_atomic(
        &root.join(RUN_MANIFEST_SUMMARY),
        &serde_json::to_vec_pretty(&summary)?,
    )?;

    tracing::info!(
        total = summary.total,
        pages = summary.pages,
        assets = summary.assets,
        bulk = summary.bulk_artifacts,
        api_samples = summary.api_samples,
        "Wrote run manifest"
    );
    Ok(summary)
}
