//! Manifest / incremental state tracker
//!
//! A manifest is the URL-keyed record set of one output section. It is
//! persisted as `manifest.json` (a JSON array) with a `manifest.jsonl`
//! mirror holding one record per line.

use super::dedup::write_atomic;
use super::error::{StorageError, StorageResult};
use super::record::FetchRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const MANIFEST_JSON: &str = "manifest.json";
pub const MANIFEST_JSONL: &str = "manifest.jsonl";

/// What a merge did to the record set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    /// The existing record was fetched later than the incoming one
    KeptExisting,
}

/// URL-keyed, insertion-ordered set of fetch records
#[derive(Debug)]
pub struct Manifest {
    dir: PathBuf,
    records: Vec<FetchRecord>,
    index: HashMap<String, usize>,
    unflushed: usize,
}

impl Manifest {
    /// Creates an empty manifest that will flush into `dir`
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            records: Vec::new(),
            index: HashMap::new(),
            unflushed: 0,
        }
    }

    /// Loads the manifest stored in `dir`
    ///
    /// `manifest.json` is read when present, otherwise `manifest.jsonl`.
    /// Neither file present yields an empty manifest. A file that exists but
    /// cannot be parsed is an error: starting empty would silently discard
    /// the dedup and incremental history.
    pub fn load(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let mut manifest = Self::empty(dir);

        let json_path = manifest.dir.join(MANIFEST_JSON);
        let jsonl_path = manifest.dir.join(MANIFEST_JSONL);

        let records = match read_optional(&json_path)? {
            Some(content) => parse_json_array(&json_path, &content)?,
            None => match read_optional(&jsonl_path)? {
                Some(content) => parse_json_lines(&jsonl_path, &content)?,
                None => {
                    tracing::debug!(dir = %manifest.dir.display(), "No prior manifest, starting fresh");
                    return Ok(manifest);
                }
            },
        };

        for record in records {
            manifest.merge(record);
        }
        manifest.unflushed = 0;

        tracing::info!(
            dir = %manifest.dir.display(),
            records = manifest.records.len(),
            "Loaded prior manifest"
        );
        Ok(manifest)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lookup(&self, url: &str) -> Option<&FetchRecord> {
        self.index.get(url).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[FetchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of changes since the last flush
    pub fn unflushed(&self) -> usize {
        self.unflushed
    }

    /// True iff `since` is set and the record was fetched before it
    pub fn is_stale(record: &FetchRecord, since: Option<DateTime<Utc>>) -> bool {
        record.is_stale(since)
    }

    /// Merges a record, keyed by URL
    ///
    /// A record for a new URL is appended. For a known URL the record with
    /// the most recent `fetched_at` wins; on a tie the incoming record
    /// replaces the existing one in place, so merging the same record twice
    /// leaves a single entry.
    pub fn merge(&mut self, record: FetchRecord) -> MergeOutcome {
        match self.index.get(&record.url) {
            Some(&i) => {
                if self.records[i].fetched_at > record.fetched_at {
                    return MergeOutcome::KeptExisting;
                }
                self.records[i] = record;
                self.unflushed += 1;
                MergeOutcome::Replaced
            }
            None => {
                self.index.insert(record.url.clone(), self.records.len());
                self.records.push(record);
                self.unflushed += 1;
                MergeOutcome::Inserted
            }
        }
    }

    /// Refreshes `fetched_at` for a record that answered 304
    ///
    /// Body-derived fields are left untouched. Returns the updated record.
    pub fn touch(&mut self, url: &str, fetched_at: DateTime<Utc>) -> Option<&FetchRecord> {
        let &i = self.index.get(url)?;
        if self.records[i].fetched_at < fetched_at {
            self.records[i].fetched_at = fetched_at;
            self.unflushed += 1;
        }
        Some(&self.records[i])
    }

    /// Writes the full record set to `manifest.json` and `manifest.jsonl`
    ///
    /// Both files are replaced atomically.
    pub fn flush(&mut self) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.dir.join(MANIFEST_JSON), &json)?;

        let mut lines = Vec::with_capacity(json.len());
        for record in &self.records {
            serde_json::to_writer(&mut lines, record)?;
            lines.push(b'\n');
        }
        write_atomic(&self.dir.join(MANIFEST_JSONL), &lines)?;

        tracing::debug!(
            dir = %self.dir.display(),
            records = self.records.len(),
            "Flushed manifest"
        );
        self.unflushed = 0;
        Ok(())
    }
}

fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

fn parse_json_array(path: &Path, content: &str) -> StorageResult<Vec<FetchRecord>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(content).map_err(|source| StorageError::CorruptManifest {
        path: path.to_path_buf(),
        line: None,
        source,
    })
}

fn parse_json_lines(path: &Path, content: &str) -> StorageResult<Vec<FetchRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|source| StorageError::CorruptManifest {
                path: path.to_path_buf(),
                line: Some(n + 1),
                source,
            })
        })
        .collect()
}
