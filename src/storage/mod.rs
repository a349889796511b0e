//! Storage module for persisting harvest results
//!
//! This module owns everything written under the output root:
//! - The content-addressable dedup store (`html/`, `assets/`, `bulk/`, `api_samples/`)
//! - Per-section manifests (`manifest.json` + `manifest.jsonl`)
//! - `failures.jsonl`, `skipped.jsonl` and `disallowed.jsonl` event logs
//! - The single writer task that serializes all of the above

mod dedup;
mod error;
mod logs;
mod manifest;
mod record;
mod writer;

pub use dedup::{content_sha256, derive_path, extension_for, ContentArea, DedupStore, StoredContent};
pub(crate) use dedup::write_atomic;
pub use error::{StorageError, StorageResult};
pub use logs::{
    read_log, reason, DisallowedEntry, FailureEntry, JsonlLog, SkipEntry, DISALLOWED_LOG,
    FAILURES_LOG, SKIPPED_LOG,
};
pub use manifest::{Manifest, MergeOutcome, MANIFEST_JSON, MANIFEST_JSONL};
pub use record::FetchRecord;
pub use writer::{spawn_writer, HarvestStore, RecordDraft, Section, WriterHandle};

#[cfg(test)]
pub(crate) use record::sample_record;
