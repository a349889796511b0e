//! Content-addressable dedup store
//!
//! Response bodies are keyed by their SHA-256. A body whose hash is already
//! known is never written a second time; the existing path is reused.

use super::error::{StorageError, StorageResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Top-level directory a body is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentArea {
    Html,
    Assets,
    Bulk,
    ApiSamples,
}

impl ContentArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Assets => "assets",
            Self::Bulk => "bulk",
            Self::ApiSamples => "api_samples",
        }
    }
}

/// Result of storing one body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub sha256: String,
    /// Relative to the store root, `/`-separated
    pub local_path: String,
    pub deduped: bool,
}

/// Hex SHA-256 of a body
pub fn content_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Maps content hashes to stored paths under a root directory
#[derive(Debug)]
pub struct DedupStore {
    root: PathBuf,
    by_hash: HashMap<String, String>,
}

impl DedupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            by_hash: HashMap::new(),
        }
    }

    /// Registers a hash already present on disk (from a prior manifest)
    ///
    /// The first registration of a hash wins.
    pub fn register(&mut self, sha256: &str, local_path: &str) {
        if sha256.is_empty() || local_path.is_empty() {
            return;
        }
        self.by_hash
            .entry(sha256.to_string())
            .or_insert_with(|| local_path.to_string());
    }

    pub fn path_for_hash(&self, sha256: &str) -> Option<&str> {
        self.by_hash.get(sha256).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Stores a body, or reuses the stored copy of identical bytes
    ///
    /// New content goes to a path derived from the URL (see [`derive_path`]).
    /// If that path already holds different bytes, the file name gets a
    /// `-{sha8}` suffix instead of overwriting. If the derived path is a
    /// directory, or one of its parents is a file (`/v2.1` then `/v2.1/docs`),
    /// the body goes to `{area}/{host}/_by-hash/{sha256}.{extension}`.
    pub fn store(
        &mut self,
        bytes: &[u8],
        url: &Url,
        area: ContentArea,
        extension: &str,
    ) -> StorageResult<StoredContent> {
        let sha256 = content_sha256(bytes);

        if let Some(existing) = self.by_hash.get(&sha256).cloned() {
            let full = self.root.join(&existing);
            if full.is_file() {
                return Ok(StoredContent {
                    sha256,
                    local_path: existing,
                    deduped: true,
                });
            }
            tracing::warn!(path = %existing, "Stored content missing on disk, rewriting");
            write_atomic(&full, bytes)?;
            return Ok(StoredContent {
                sha256,
                local_path: existing,
                deduped: false,
            });
        }

        let mut local_path = derive_path(area, url, extension);
        if self.is_blocked(&local_path) {
            let fallback = hashed_path(area, url, &sha256, extension);
            tracing::debug!(url = %url, path = %local_path, fallback = %fallback, "Derived path collides with stored content");
            local_path = fallback;
        }
        let mut full = self.root.join(&local_path);

        if full.is_file() {
            let on_disk = std::fs::read(&full).map_err(|e| StorageError::io(&full, e))?;
            if content_sha256(&on_disk) != sha256 {
                local_path = with_suffix(&local_path, &sha256[..8]);
                full = self.root.join(&local_path);
            }
        }

        if !full.is_file() {
            write_atomic(&full, bytes)?;
        }

        self.by_hash.insert(sha256.clone(), local_path.clone());
        Ok(StoredContent {
            sha256,
            local_path,
            deduped: false,
        })
    }

    /// True if `local_path` cannot hold a file: it is a directory, or some
    /// parent below the root is a file
    fn is_blocked(&self, local_path: &str) -> bool {
        if self.root.join(local_path).is_dir() {
            return true;
        }
        Path::new(local_path)
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .any(|dir| self.root.join(dir).is_file())
    }
}

fn host_dir(url: &Url) -> String {
    crate::url::host_key(url)
        .map(|h| sanitize_segment(&h))
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Content-addressed path used when the URL-derived one is unusable
fn hashed_path(area: ContentArea, url: &Url, sha256: &str, extension: &str) -> String {
    format!(
        "{}/{}/_by-hash/{}.{}",
        area.dir_name(),
        host_dir(url),
        sha256,
        extension
    )
}

/// Derives the store path for a URL
///
/// The layout is `{area}/{host}/{path segments}`. When the path is empty,
/// ends in `/`, or its last segment has no extension, the last segment is
/// treated as a directory and the body becomes `index.{extension}` beneath
/// it, so `/docs` and `/docs/guide` can both be stored. A query string adds
/// a stable hash of the query to the file stem.
pub fn derive_path(area: ContentArea, url: &Url, extension: &str) -> String {
    let mut parts = vec![area.dir_name().to_string(), host_dir(url)];
    let segments: Vec<String> = url
        .path_segments()
        .map(|segs| {
            segs.filter(|s| !s.is_empty())
                .map(sanitize_segment)
                .collect()
        })
        .unwrap_or_default();

    let ends_with_slash = url.path().ends_with('/');
    let last_has_extension = segments
        .last()
        .and_then(|s| Path::new(s).extension())
        .is_some();

    parts.extend(segments.iter().cloned());
    if segments.is_empty() || ends_with_slash || !last_has_extension {
        parts.push(format!("index.{}", extension));
    }

    let mut path = parts.join("/");
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        let digest = content_sha256(query.as_bytes());
        path = with_suffix(&path, &digest[..8]);
    }
    path
}

/// Picks a file extension for an `index` file from the content type
pub fn extension_for(content_type: Option<&str>, is_html: bool) -> &'static str {
    if is_html {
        return "html";
    }
    let content_type = content_type.unwrap_or("").to_lowercase();
    if content_type.contains("json") {
        "json"
    } else if content_type.contains("xml") {
        "xml"
    } else if content_type.contains("zip") {
        "zip"
    } else if content_type.contains("pdf") {
        "pdf"
    } else if content_type.contains("csv") {
        "csv"
    } else if content_type.starts_with("text/plain") {
        "txt"
    } else {
        "bin"
    }
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '%') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Inserts `-{suffix}` before the extension of the final path component
fn with_suffix(local_path: &str, suffix: &str) -> String {
    let (dir, file) = match local_path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, local_path),
    };
    let renamed = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, ext),
        _ => format!("{}-{}", file, suffix),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, renamed),
        None => renamed,
    }
}

/// Writes a file through a temporary sibling and a rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    std::fs::write(&tmp, bytes).map_err(|e| StorageError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}
