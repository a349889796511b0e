//! API sample phase
//!
//! A bounded number of API endpoints are fetched once per run and their
//! responses kept as samples. An unchanged response refreshes the existing
//! record instead of writing a new one.

use super::fetcher::{FetchOutcome, OutcomeKind};
use super::{failure_entry, outcome_state, HarvestContext};
use crate::output::HarvestSummary;
use crate::state::TargetState;
use crate::storage::{content_sha256, reason, ContentArea, FetchRecord, RecordDraft, Section};
use crate::url::{canonicalize, host_key};
use crate::Result;
use std::collections::HashSet;

/// A 200 whose validators or bytes match the stored sample counts as unchanged
fn matches_prior(outcome: &FetchOutcome, body: &[u8], prior: &FetchRecord) -> bool {
    let same = |a: &Option<String>, b: &Option<String>| matches!((a, b), (Some(a), Some(b)) if a == b);
    same(&prior.etag, &outcome.etag)
        || same(&prior.last_modified, &outcome.last_modified)
        || content_sha256(body) == prior.sha256
}

/// Runs the API sample phase
pub async fn run_api_samples(ctx: &mut HarvestContext, summary: &mut HarvestSummary) -> Result<()> {
    let samples = ctx.config.api_samples.clone();
    if samples.urls.is_empty() || samples.limit == 0 {
        return Ok(());
    }

    let mut seen = HashSet::new();
    let targets: Vec<_> = samples
        .urls
        .iter()
        .filter_map(|raw| match canonicalize(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(url = %raw, error = %e, "Ignoring invalid API sample URL");
                None
            }
        })
        .filter(|url| seen.insert(url.to_string()))
        .take(samples.limit)
        .collect();

    tracing::info!(endpoints = targets.len(), "Sampling API endpoints");

    for url in targets {
        let Some(host) = host_key(&url) else {
            continue;
        };
        let state = TargetState::Queued;

        if !ctx.robots.allows(&url).await? {
            state.transition(TargetState::RobotsDenied)?.settle()?;
            summary.record_skip(reason::ROBOTS);
            continue;
        }

        let prior = ctx.writer.lookup(Section::ApiSamples, url.as_str()).await?;
        let mut outcome = ctx.polite_fetch(&url, &host, prior.as_ref()).await;
        let fetched_state = outcome_state(&outcome)?;

        match outcome.kind {
            OutcomeKind::NotModified => {
                ctx.writer.touch(Section::ApiSamples, url.as_str()).await?;
                summary.not_modified += 1;
            }
            OutcomeKind::ClientError | OutcomeKind::RetryableFailure => {
                let entry = failure_entry(&outcome);
                summary.record_failure(&entry.reason);
                ctx.writer.log_failure(Section::ApiSamples, entry).await?;
            }
            OutcomeKind::Success => {
                let body = outcome.body.take().unwrap_or_default();
                if prior
                    .as_ref()
                    .is_some_and(|p| matches_prior(&outcome, &body, p))
                {
                    ctx.writer.touch(Section::ApiSamples, url.as_str()).await?;
                    summary.not_modified += 1;
                    tracing::debug!(url = %url, "API sample unchanged");
                } else {
                    let draft = RecordDraft {
                        url: url.clone(),
                        status_code: outcome.status_code.unwrap_or(200),
                        content_type: outcome.content_type.clone(),
                        etag: outcome.etag.clone(),
                        last_modified: outcome.last_modified.clone(),
                        content_length: outcome.content_length,
                        depth: 0,
                        is_html: false,
                        area: ContentArea::ApiSamples,
                        is_bulk_artifact: false,
                        is_api_sample: true,
                    };
                    let record = ctx.writer.record(Section::ApiSamples, draft, body).await?;
                    summary.fetched += 1;
                    summary.api_samples += 1;
                    if record.deduped_by_hash {
                        summary.deduped += 1;
                    }
                    tracing::debug!(url = %url, path = %record.local_path, "API sample stored");
                }
            }
        }
        fetched_state.settle()?;
    }
    Ok(())
}
