//! Bulk artifact phase
//!
//! Bulk URLs are downloaded one after another under a count budget and a
//! cumulative byte budget. A HEAD request comes first: it settles unchanged
//! artifacts without a download and rejects ones whose declared size would
//! not fit. A download that overflows the byte budget once its real size is
//! known ends the phase.

use super::fetcher::{FetchOutcome, OutcomeKind};
use super::{failure_entry, outcome_state, HarvestContext};
use crate::output::HarvestSummary;
use crate::state::{BudgetRejection, BulkBudget, TargetState};
use crate::storage::{reason, ContentArea, FailureEntry, FetchRecord, RecordDraft, Section};
use crate::url::{canonicalize, host_key, host_name, ScopePolicy};
use crate::Result;
use std::collections::HashSet;
use url::Url;

/// Whether a HEAD response shows the stored artifact is still current
fn unchanged_by_head(head: &FetchOutcome, prior: Option<&FetchRecord>) -> bool {
    if head.is_not_modified() {
        return true;
    }
    let (Some(prior), true) = (prior, head.is_success()) else {
        return false;
    };
    let etag_matches = matches!((&prior.etag, &head.etag), (Some(a), Some(b)) if a == b);
    let modified_matches =
        matches!((&prior.last_modified, &head.last_modified), (Some(a), Some(b)) if a == b);
    etag_matches || modified_matches
}

fn size_limit_entry(url: &Url, rejection: &BudgetRejection) -> FailureEntry {
    let host = host_name(url).unwrap_or_default();
    let mut entry = FailureEntry::new(url.as_str(), host, rejection.reason());
    if let BudgetRejection::BytesExceeded { remaining_bytes } = rejection {
        entry.remaining_bytes = Some(*remaining_bytes);
    }
    entry
}

/// Runs the bulk phase
pub async fn run_bulk(ctx: &mut HarvestContext, summary: &mut HarvestSummary) -> Result<()> {
    let bulk = ctx.config.bulk.clone();
    if bulk.urls.is_empty() {
        return Ok(());
    }

    let scope = ScopePolicy::new(bulk.allow_hosts.clone(), bulk.deny_hosts.clone());
    let mut budget = BulkBudget::new(bulk.max_bulk, bulk.max_bulk_bytes);
    let mut seen = HashSet::new();

    tracing::info!(
        urls = bulk.urls.len(),
        max_bulk = bulk.max_bulk,
        max_bulk_bytes = bulk.max_bulk_bytes,
        "Starting bulk downloads"
    );

    for raw in &bulk.urls {
        if budget.is_exhausted() {
            tracing::info!("Bulk budget exhausted");
            break;
        }

        let url = match canonicalize(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %raw, error = %e, "Ignoring invalid bulk URL");
                continue;
            }
        };
        if !seen.insert(url.to_string()) {
            continue;
        }
        let Some(host) = host_key(&url) else {
            continue;
        };
        let state = TargetState::Queued;

        if !scope.permits(&url) {
            ctx.skip(Section::Bulk, &url, reason::SCOPE, summary).await?;
            continue;
        }
        if !ctx.robots.allows(&url).await? {
            state.transition(TargetState::RobotsDenied)?.settle()?;
            summary.record_skip(reason::ROBOTS);
            continue;
        }

        let prior = ctx.writer.lookup(Section::Bulk, url.as_str()).await?;
        if prior.as_ref().is_some_and(|r| !r.is_stale(ctx.since)) {
            ctx.skip(Section::Bulk, &url, reason::FRESH, summary).await?;
            continue;
        }

        let head = ctx.polite_head(&url, &host, prior.as_ref()).await;
        if unchanged_by_head(&head, prior.as_ref()) {
            ctx.writer.touch(Section::Bulk, url.as_str()).await?;
            state
                .transition(TargetState::Fetching)?
                .transition(TargetState::NotModified)?
                .settle()?;
            summary.not_modified += 1;
            tracing::debug!(url = %url, "Bulk artifact unchanged");
            continue;
        }

        if let Some(declared) = head.content_length.filter(|_| head.is_success()) {
            if let Err(rejection) = budget.check(declared) {
                let mut entry = size_limit_entry(&url, &rejection);
                entry.declared_size = Some(declared);
                tracing::info!(url = %url, declared, remaining = budget.remaining_bytes(), "Bulk artifact too large");
                state.transition(TargetState::SizeRejected)?.settle()?;
                summary.record_failure(rejection.reason());
                ctx.writer.log_failure(Section::Bulk, entry).await?;
                continue;
            }
        }

        let mut outcome = ctx.polite_fetch(&url, &host, prior.as_ref()).await;
        let fetched_state = outcome_state(&outcome)?;
        match outcome.kind {
            OutcomeKind::NotModified => {
                ctx.writer.touch(Section::Bulk, url.as_str()).await?;
                summary.not_modified += 1;
            }
            OutcomeKind::ClientError | OutcomeKind::RetryableFailure => {
                let entry = failure_entry(&outcome);
                summary.record_failure(&entry.reason);
                ctx.writer.log_failure(Section::Bulk, entry).await?;
            }
            OutcomeKind::Success => {
                let body = outcome.body.take().unwrap_or_default();
                let size = body.len() as u64;

                if let Err(rejection) = budget.commit(size) {
                    let mut entry = size_limit_entry(&url, &rejection);
                    entry.actual_size = Some(size);
                    entry.declared_size = outcome.content_length;
                    tracing::warn!(url = %url, size, remaining = budget.remaining_bytes(), "Bulk byte budget exceeded, stopping");
                    TargetState::Fetching
                        .transition(TargetState::SizeRejected)?
                        .settle()?;
                    summary.record_failure(rejection.reason());
                    ctx.writer.log_failure(Section::Bulk, entry).await?;
                    break;
                }

                let draft = RecordDraft {
                    url: url.clone(),
                    status_code: outcome.status_code.unwrap_or(200),
                    content_type: outcome.content_type.clone(),
                    etag: outcome.etag.clone(),
                    last_modified: outcome.last_modified.clone(),
                    content_length: outcome.content_length,
                    depth: 0,
                    is_html: false,
                    area: ContentArea::Bulk,
                    is_bulk_artifact: true,
                    is_api_sample: false,
                };
                let record = ctx.writer.record(Section::Bulk, draft, body).await?;
                summary.fetched += 1;
                summary.bulk_artifacts += 1;
                summary.bulk_bytes += size;
                if record.deduped_by_hash {
                    summary.deduped += 1;
                }
                tracing::info!(url = %url, size, path = %record.local_path, "Bulk artifact stored");
            }
        }
        fetched_state.settle()?;
    }

    tracing::info!(
        artifacts = budget.consumed_count,
        bytes = budget.consumed_bytes,
        "Bulk downloads completed"
    );
    Ok(())
}
