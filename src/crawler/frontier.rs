//! URL frontier and scope filter
//!
//! FIFO queue of crawl targets. A URL is admitted at most once per run: it
//! must canonicalize, pass the host scope policy and sit within the depth
//! limit.

use crate::url::{canonicalize, classify, ScopePolicy, TargetKind};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL scheduled for fetching; consumed exactly once when dequeued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: Url,
    pub depth: u32,
    pub kind: TargetKind,
}

/// What happened to a URL offered to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    Duplicate,
    OutOfScope,
    TooDeep,
    Invalid,
}

#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<CrawlTarget>,
    seen: HashSet<String>,
    scope: ScopePolicy,
    max_depth: u32,
    extensions: Vec<String>,
}

impl Frontier {
    pub fn new(scope: ScopePolicy, max_depth: u32, extensions: Vec<String>) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            scope,
            max_depth,
            extensions,
        }
    }

    /// Offers a raw URL at `depth`
    pub fn enqueue(&mut self, raw: &str, depth: u32) -> EnqueueResult {
        if depth > self.max_depth {
            return EnqueueResult::TooDeep;
        }

        let url = match canonicalize(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!(url = raw, error = %e, "Rejected URL");
                return EnqueueResult::Invalid;
            }
        };

        if self.seen.contains(url.as_str()) {
            return EnqueueResult::Duplicate;
        }

        if !self.scope.permits(&url) {
            tracing::trace!(url = %url, "Out of scope");
            return EnqueueResult::OutOfScope;
        }

        self.seen.insert(url.to_string());
        let kind = classify(&url, &self.extensions);
        self.queue.push_back(CrawlTarget { url, depth, kind });
        EnqueueResult::Queued
    }

    /// Removes the oldest target
    pub fn dequeue(&mut self) -> Option<CrawlTarget> {
        self.queue.pop_front()
    }

    /// Removes the oldest target accepted by `eligible`
    ///
    /// Targets skipped over keep their place in the queue.
    pub fn dequeue_where<F>(&mut self, mut eligible: F) -> Option<CrawlTarget>
    where
        F: FnMut(&CrawlTarget) -> bool,
    {
        let index = self.queue.iter().position(|t| eligible(t))?;
        self.queue.remove(index)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs admitted so far
    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}
