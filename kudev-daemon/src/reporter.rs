//! User-facing progress, injected into the orchestrator.

use std::path::Path;

use kudev_core::{EventBatch, SourceDigest};

use crate::error::DaemonError;
use crate::pipeline::DeploySummary;

/// Receives watch-loop milestones. Implementations must be cheap; they are
/// called inline from the loop.
pub trait Reporter: Send + Sync {
    fn watching(&self, root: &Path, digest: &SourceDigest);
    fn changes(&self, batch: &EventBatch);
    fn unchanged(&self, digest: &SourceDigest);
    fn rebuilding(&self, previous: Option<&SourceDigest>, next: &SourceDigest);
    fn deployed(&self, summary: &DeploySummary);
    fn failed(&self, error: &DaemonError);
}

/// Reports through `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn watching(&self, root: &Path, digest: &SourceDigest) {
        tracing::info!(root = %root.display(), %digest, "watching for changes");
    }

    fn changes(&self, batch: &EventBatch) {
        let first = batch.first().map(|e| e.path.as_str()).unwrap_or_default();
        tracing::info!(events = batch.len(), first, "changes detected");
    }

    fn unchanged(&self, digest: &SourceDigest) {
        tracing::info!(%digest, "source digest unchanged, skipping rebuild");
    }

    fn rebuilding(&self, previous: Option<&SourceDigest>, next: &SourceDigest) {
        let previous = previous.map(SourceDigest::as_str).unwrap_or("none");
        tracing::info!(previous, next = %next, "rebuilding");
    }

    fn deployed(&self, summary: &DeploySummary) {
        tracing::info!(
            image = %summary.image_ref,
            status = %summary.status.status_code,
            ready = summary.status.ready_replicas,
            desired = summary.status.desired_replicas,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "{}",
            summary.status.message,
        );
    }

    fn failed(&self, error: &DaemonError) {
        tracing::error!(error = %error, "rebuild failed");
    }
}
