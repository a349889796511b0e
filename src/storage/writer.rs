//! Single writer for manifests, the content store and the logs
//!
//! Fetch workers never touch the shared on-disk state directly. They send
//! commands to one writer task over a channel; the task owns a
//! [`HarvestStore`] and applies commands one at a time, which keeps the
//! "one record per URL" and "one copy per hash" invariants without a lock
//! around every fetch.

use super::dedup::{extension_for, ContentArea, DedupStore};
use super::error::{StorageError, StorageResult};
use super::logs::{
    DisallowedEntry, FailureEntry, JsonlLog, SkipEntry, DISALLOWED_LOG, FAILURES_LOG, SKIPPED_LOG,
};
use super::manifest::Manifest;
use super::record::FetchRecord;
use crate::url::host_name;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

const CHANNEL_CAPACITY: usize = 256;

/// Output section with its own manifest and failure log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Pages and assets; manifest at the output root
    Crawl,
    /// Bulk artifacts under `bulk/`
    Bulk,
    /// API samples under `api_samples/`
    ApiSamples,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Crawl, Section::Bulk, Section::ApiSamples];

    pub fn dir(&self, root: &Path) -> PathBuf {
        match self {
            Self::Crawl => root.to_path_buf(),
            Self::Bulk => root.join(ContentArea::Bulk.dir_name()),
            Self::ApiSamples => root.join(ContentArea::ApiSamples.dir_name()),
        }
    }

    /// Tag used for this section in the run manifest
    pub fn origin(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Bulk => "bulk",
            Self::ApiSamples => "api_samples",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Crawl => 0,
            Self::Bulk => 1,
            Self::ApiSamples => 2,
        }
    }
}

/// Everything about a successful fetch except what the store derives from the body
///
/// The record's `host` is the URL's host name, without a port.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,
    pub depth: u32,
    pub is_html: bool,
    pub area: ContentArea,
    pub is_bulk_artifact: bool,
    pub is_api_sample: bool,
}

/// On-disk state of one output root
#[derive(Debug)]
pub struct HarvestStore {
    root: PathBuf,
    manifests: [Manifest; 3],
    failures: [JsonlLog; 3],
    skipped: [JsonlLog; 3],
    disallowed: JsonlLog,
    dedup: DedupStore,
    flush_every: usize,
}

impl HarvestStore {
    /// Opens an output root for a new run
    ///
    /// Prior manifests are loaded (a corrupt one is an error) and every
    /// recorded hash is registered with the dedup store. Failure, skip and
    /// disallowed logs start empty.
    pub fn open(root: impl Into<PathBuf>, flush_every: usize) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;

        let manifests = [
            Manifest::load(Section::Crawl.dir(&root))?,
            Manifest::load(Section::Bulk.dir(&root))?,
            Manifest::load(Section::ApiSamples.dir(&root))?,
        ];

        let mut dedup = DedupStore::new(&root);
        for manifest in &manifests {
            for record in manifest.records() {
                dedup.register(&record.sha256, &record.local_path);
            }
        }

        let failures = [
            JsonlLog::create(Section::Crawl.dir(&root).join(FAILURES_LOG))?,
            JsonlLog::create(Section::Bulk.dir(&root).join(FAILURES_LOG))?,
            JsonlLog::create(Section::ApiSamples.dir(&root).join(FAILURES_LOG))?,
        ];
        let skipped = [
            JsonlLog::create(Section::Crawl.dir(&root).join(SKIPPED_LOG))?,
            JsonlLog::create(Section::Bulk.dir(&root).join(SKIPPED_LOG))?,
            JsonlLog::create(Section::ApiSamples.dir(&root).join(SKIPPED_LOG))?,
        ];
        let disallowed = JsonlLog::create(root.join(DISALLOWED_LOG))?;

        tracing::debug!(root = %root.display(), known_hashes = dedup.len(), "Opened harvest store");

        Ok(Self {
            root,
            manifests,
            failures,
            skipped,
            disallowed,
            dedup,
            flush_every: flush_every.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self, section: Section) -> &Manifest {
        &self.manifests[section.index()]
    }

    pub fn lookup(&self, section: Section, url: &str) -> Option<FetchRecord> {
        self.manifest(section).lookup(url).cloned()
    }

    /// Stores a body and merges its record into the section's manifest
    pub fn record(
        &mut self,
        section: Section,
        draft: RecordDraft,
        body: &[u8],
    ) -> StorageResult<FetchRecord> {
        let extension = extension_for(draft.content_type.as_deref(), draft.is_html);
        let stored = self.dedup.store(body, &draft.url, draft.area, extension)?;

        let record = FetchRecord {
            url: draft.url.to_string(),
            host: host_name(&draft.url).unwrap_or_default(),
            local_path: stored.local_path,
            status_code: draft.status_code,
            content_type: draft.content_type,
            etag: draft.etag,
            last_modified: draft.last_modified,
            content_length: draft.content_length,
            sha256: stored.sha256,
            size_bytes: body.len() as u64,
            fetched_at: Utc::now(),
            depth: draft.depth,
            is_html: draft.is_html,
            deduped_by_hash: stored.deduped,
            is_bulk_artifact: draft.is_bulk_artifact,
            is_api_sample: draft.is_api_sample,
        };

        self.manifests[section.index()].merge(record.clone());
        self.maybe_flush(section)?;
        Ok(record)
    }

    /// Refreshes `fetched_at` of an unchanged record
    pub fn touch(&mut self, section: Section, url: &str) -> StorageResult<Option<FetchRecord>> {
        let touched = self.manifests[section.index()]
            .touch(url, Utc::now())
            .cloned();
        self.maybe_flush(section)?;
        Ok(touched)
    }

    pub fn log_failure(&mut self, section: Section, entry: &FailureEntry) -> StorageResult<()> {
        self.failures[section.index()].append(entry)
    }

    pub fn log_skip(&mut self, section: Section, entry: &SkipEntry) -> StorageResult<()> {
        self.skipped[section.index()].append(entry)
    }

    pub fn log_disallowed(&mut self, entry: &DisallowedEntry) -> StorageResult<()> {
        self.disallowed.append(entry)
    }

    pub fn flush_all(&mut self) -> StorageResult<()> {
        for manifest in &mut self.manifests {
            manifest.flush()?;
        }
        Ok(())
    }

    fn maybe_flush(&mut self, section: Section) -> StorageResult<()> {
        let manifest = &mut self.manifests[section.index()];
        if manifest.unflushed() >= self.flush_every {
            manifest.flush()?;
        }
        Ok(())
    }
}

enum Command {
    Lookup {
        section: Section,
        url: String,
        reply: oneshot::Sender<Option<FetchRecord>>,
    },
    Record {
        section: Section,
        draft: Box<RecordDraft>,
        body: Vec<u8>,
        reply: oneshot::Sender<StorageResult<FetchRecord>>,
    },
    Touch {
        section: Section,
        url: String,
        reply: oneshot::Sender<StorageResult<Option<FetchRecord>>>,
    },
    LogFailure {
        section: Section,
        entry: FailureEntry,
        reply: oneshot::Sender<StorageResult<()>>,
    },
    LogSkip {
        section: Section,
        entry: SkipEntry,
        reply: oneshot::Sender<StorageResult<()>>,
    },
    LogDisallowed {
        entry: DisallowedEntry,
        reply: oneshot::Sender<StorageResult<()>>,
    },
    Flush {
        reply: oneshot::Sender<StorageResult<()>>,
    },
    Records {
        section: Section,
        reply: oneshot::Sender<Vec<FetchRecord>>,
    },
}

/// Cloneable handle to the writer task
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Command>,
    root: PathBuf,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lookup { .. } => "Lookup",
            Self::Record { .. } => "Record",
            Self::Touch { .. } => "Touch",
            Self::LogFailure { .. } => "LogFailure",
            Self::LogSkip { .. } => "LogSkip",
            Self::LogDisallowed { .. } => "LogDisallowed",
            Self::Flush { .. } => "Flush",
            Self::Records { .. } => "Records",
        };
        f.write_str(name)
    }
}

/// Starts the writer task
///
/// The task runs until every [`WriterHandle`] is dropped, then flushes all
/// manifests one last time.
pub fn spawn_writer(store: HarvestStore) -> (WriterHandle, JoinHandle<StorageResult<()>>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let handle = WriterHandle {
        tx,
        root: store.root().to_path_buf(),
    };
    let task = tokio::spawn(run_writer(store, rx));
    (handle, task)
}

async fn run_writer(mut store: HarvestStore, mut rx: mpsc::Receiver<Command>) -> StorageResult<()> {
    while let Some(command) = rx.recv().await {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::Lookup {
                section,
                url,
                reply,
            } => {
                let _ = reply.send(store.lookup(section, &url));
            }
            Command::Record {
                section,
                draft,
                body,
                reply,
            } => {
                let _ = reply.send(store.record(section, *draft, &body));
            }
            Command::Touch {
                section,
                url,
                reply,
            } => {
                let _ = reply.send(store.touch(section, &url));
            }
            Command::LogFailure {
                section,
                entry,
                reply,
            } => {
                let _ = reply.send(store.log_failure(section, &entry));
            }
            Command::LogSkip {
                section,
                entry,
                reply,
            } => {
                let _ = reply.send(store.log_skip(section, &entry));
            }
            Command::LogDisallowed { entry, reply } => {
                let _ = reply.send(store.log_disallowed(&entry));
            }
            Command::Flush { reply } => {
                let _ = reply.send(store.flush_all());
            }
            Command::Records { section, reply } => {
                let _ = reply.send(store.manifest(section).records().to_vec());
            }
        }
    }

    store.flush_all()
}

impl WriterHandle {
    /// Output root the writer manages
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> StorageResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| StorageError::WriterClosed)?;
        rx.await.map_err(|_| StorageError::WriterClosed)
    }

    pub async fn lookup(&self, section: Section, url: &str) -> StorageResult<Option<FetchRecord>> {
        let url = url.to_string();
        self.request(|reply| Command::Lookup {
            section,
            url,
            reply,
        })
        .await
    }

    pub async fn record(
        &self,
        section: Section,
        draft: RecordDraft,
        body: Vec<u8>,
    ) -> StorageResult<FetchRecord> {
        self.request(|reply| Command::Record {
            section,
            draft: Box::new(draft),
            body,
            reply,
        })
        .await?
    }

    pub async fn touch(&self, section: Section, url: &str) -> StorageResult<Option<FetchRecord>> {
        let url = url.to_string();
        self.request(|reply| Command::Touch {
            section,
            url,
            reply,
        })
        .await?
    }

    pub async fn log_failure(&self, section: Section, entry: FailureEntry) -> StorageResult<()> {
        self.request(|reply| Command::LogFailure {
            section,
            entry,
            reply,
        })
        .await?
    }

    pub async fn log_skip(&self, section: Section, entry: SkipEntry) -> StorageResult<()> {
        self.request(|reply| Command::LogSkip {
            section,
            entry,
            reply,
        })
        .await?
    }

    pub async fn log_disallowed(&self, entry: DisallowedEntry) -> StorageResult<()> {
        self.request(|reply| Command::LogDisallowed { entry, reply })
            .await?
    }

    pub async fn flush(&self) -> StorageResult<()> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    pub async fn records(&self, section: Section) -> StorageResult<Vec<FetchRecord>> {
        self.request(|reply| Command::Records { section, reply })
            .await
    }
}
