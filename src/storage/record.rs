use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One persisted fetch, keyed by URL in a manifest
///
/// Field names are stable: downstream readers consume manifests directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    pub host: String,

    /// Path of the stored body, relative to the output root, `/`-separated
    pub local_path: String,

    pub status_code: u16,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,

    /// Declared `Content-Length`, when the server sent one
    pub content_length: Option<u64>,

    pub sha256: String,
    pub size_bytes: u64,

    #[serde(deserialize_with = "deserialize_fetched_at")]
    pub fetched_at: DateTime<Utc>,

    pub depth: u32,
    pub is_html: bool,

    /// The body matched content already in the store and was not written again
    pub deduped_by_hash: bool,

    #[serde(default)]
    pub is_bulk_artifact: bool,

    #[serde(default)]
    pub is_api_sample: bool,
}

impl FetchRecord {
    /// True iff a cutoff is set and this record was fetched before it
    pub fn is_stale(&self, since: Option<DateTime<Utc>>) -> bool {
        since.map_or(false, |cutoff| self.fetched_at < cutoff)
    }
}

/// Accepts RFC 3339 timestamps as well as offset-less ones, read as UTC
fn deserialize_fetched_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    crate::config::parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
pub(crate) fn sample_record(url: &str) -> FetchRecord {
    FetchRecord {
        url: url.to_string(),
        host: "example.com".to_string(),
        local_path: "html/example.com/index.html".to_string(),
        status_code: 200,
        content_type: Some("text/html".to_string()),
        etag: Some("\"v1\"".to_string()),
        last_modified: None,
        content_length: Some(5),
        sha256: "ab".repeat(32),
        size_bytes: 5,
        fetched_at: Utc::now(),
        depth: 0,
        is_html: true,
        deduped_by_hash: false,
        is_bulk_artifact: false,
        is_api_sample: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_is_stale() {
        let mut record = sample_record("https://example.com/");
        record.fetched_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(!record.is_stale(None));
        assert!(record.is_stale(Some(record.fetched_at + Duration::seconds(1))));
        assert!(!record.is_stale(Some(record.fetched_at)));
        assert!(!record.is_stale(Some(record.fetched_at - Duration::days(1))));
    }

    #[test]
    fn test_reads_naive_timestamp_as_utc() {
        let json = r#"{
            "url": "https://example.com/a", "host": "example.com",
            "local_path": "html/example.com/a/index.html", "status_code": 200,
            "content_type": "text/html", "etag": null, "last_modified": null,
            "content_length": null, "sha256": "00", "size_bytes": 0,
            "fetched_at": "2024-02-03T04:05:06.789", "depth": 1,
            "is_html": true, "deduped_by_hash": false
        }"#;

        let record: FetchRecord = serde_json::from_str(json).unwrap();
        assert_eq!(
            record.fetched_at.timestamp(),
            Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap().timestamp()
        );
        assert!(!record.is_bulk_artifact);
        assert!(!record.is_api_sample);
    }

    #[test]
    fn test_field_names_are_stable() {
        let value = serde_json::to_value(sample_record("https://example.com/")).unwrap();
        for field in [
            "url",
            "host",
            "local_path",
            "status_code",
            "content_type",
            "etag",
            "last_modified",
            "content_length",
            "sha256",
            "size_bytes",
            "fetched_at",
            "depth",
            "is_html",
            "deduped_by_hash",
        ] {
            assert!(value.get(field).is_some(), "missing field {}", field);
        }
    }
}
