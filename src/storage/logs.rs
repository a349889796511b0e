//! Line-delimited JSON event logs (`failures.jsonl`, `skipped.jsonl`, `disallowed.jsonl`)

use super::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const FAILURES_LOG: &str = "failures.jsonl";
pub const DISALLOWED_LOG: &str = "disallowed.jsonl";
pub const SKIPPED_LOG: &str = "skipped.jsonl";

/// Reason strings shared by the logs and the run summary
pub mod reason {
    pub const HTTP_ERROR: &str = "http_error";
    pub const REQUEST_FAILED: &str = "request_failed";
    pub const SIZE_LIMIT: &str = "size_limit";
    pub const ROBOTS: &str = "robots";
    pub const FRESH: &str = "fresh";
    pub const BUDGET: &str = "budget";
    pub const SCOPE: &str = "scope";
}

/// A URL that ended in a terminal failure or was rejected by a budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub url: String,
    pub host: String,
    /// `http_error`, `request_failed` or `size_limit`
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_bytes: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl FailureEntry {
    pub fn new(url: impl Into<String>, host: impl Into<String>, reason: &str) -> Self {
        Self {
            url: url.into(),
            host: host.into(),
            reason: reason.to_string(),
            status_code: None,
            error: None,
            attempts: None,
            declared_size: None,
            actual_size: None,
            remaining_bytes: None,
            timestamp: Utc::now(),
        }
    }
}

/// A URL settled without a request: fresh, out of budget or out of scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipEntry {
    pub url: String,
    pub host: String,
    /// `fresh`, `budget` or `scope`
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl SkipEntry {
    pub fn new(url: impl Into<String>, host: impl Into<String>, reason: &str) -> Self {
        Self {
            url: url.into(),
            host: host.into(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// A URL the robots gate refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisallowedEntry {
    pub url: String,
    pub host: String,
    pub reason: String,
    pub checked_at: DateTime<Utc>,
}

impl DisallowedEntry {
    pub fn robots(url: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            host: host.into(),
            reason: "robots.txt disallow".to_string(),
            checked_at: Utc::now(),
        }
    }
}

/// Append-only JSONL file, truncated when opened for a new run
#[derive(Debug)]
pub struct JsonlLog {
    path: PathBuf,
    file: File,
    entries: usize,
}

impl JsonlLog {
    pub fn create(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| StorageError::io(&path, e))?;
        Ok(Self {
            path,
            file,
            entries: 0,
        })
    }

    /// Appends one entry and flushes it to the OS
    pub fn append<T: Serialize>(&mut self, entry: &T) -> StorageResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .map_err(|e| StorageError::io(&self.path, e))?;
        self.entries += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Reads every entry of a JSONL log
pub fn read_log<T: for<'de> Deserialize<'de>>(path: &Path) -> StorageResult<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StorageError::from))
        .collect()
}
