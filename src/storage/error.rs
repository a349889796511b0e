use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the content store, manifests and logs
///
/// Every variant is fatal to a run: once a write fails the manifest can no
/// longer be trusted to describe what is on disk.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt manifest {path}{}: {source}", line_suffix(.line))]
    CorruptManifest {
        path: PathBuf,
        line: Option<usize>,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage writer is no longer running")]
    WriterClosed,
}

impl StorageError {
    /// Wraps an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" (line {})", l)).unwrap_or_default()
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
