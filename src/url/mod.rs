//! URL handling module
//!
//! This module provides URL canonicalization, host keys, host scope
//! filtering and page-vs-attachment classification.

mod canonical;
mod host;
mod scope;

pub use canonical::canonicalize;
pub use host::{host_key, host_name};
pub use scope::{matches_host_pattern, ScopePolicy};

use serde::{Deserialize, Serialize};
use url::Url;

/// Path prefix whose targets are always attachments
const DOCUMENTS_PREFIX: &str = "/documents/";

/// The budget class a crawl target is counted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// HTML page, counted against `max_pages`
    Page,
    /// Downloadable file, counted against `max_attachments`
    Attachment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Attachment => "attachment",
        }
    }
}

/// Classifies a URL as a page or an attachment
///
/// A URL is an attachment when its path lives under `/documents/` or ends
/// with one of `extensions` (compared case-insensitively).
///
/// # Examples
///
/// ```
/// use harvest_engine::url::{classify, TargetKind};
/// use url::Url;
///
/// let exts = vec![".pdf".to_string()];
/// let url = Url::parse("https://example.com/report.PDF").unwrap();
/// assert_eq!(classify(&url, &exts), TargetKind::Attachment);
/// ```
pub fn classify(url: &Url, extensions: &[String]) -> TargetKind {
    let path = url.path().to_lowercase();

    if path.starts_with(DOCUMENTS_PREFIX) {
        return TargetKind::Attachment;
    }

    if extensions
        .iter()
        .any(|ext| path.ends_with(&ext.to_lowercase()))
    {
        TargetKind::Attachment
    } else {
        TargetKind::Page
    }
}
