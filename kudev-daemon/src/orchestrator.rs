//! The watch → rebuild → redeploy loop.
//!
//! ## Single flight
//!
//! `{in_flight, queued, last_digest}` live under one lock. A batch that
//! arrives while a cycle runs only sets `queued`; however many arrive, the
//! running cycle is followed by exactly one more. The baseline digest is
//! committed when a cycle finishes (deployed or failed), never when it was
//! cancelled.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use kudev_core::{Config, EventBatch, SourceDigest};
use kudev_hash::{Exclusions, HashCalculator};

use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE_WINDOW};
use crate::error::DaemonError;
use crate::pipeline::Pipeline;
use crate::reporter::Reporter;
use crate::watcher::FileWatcher;

#[derive(Debug, Default)]
struct CycleState {
    in_flight: bool,
    queued: bool,
    last_digest: Option<SourceDigest>,
}

/// How a single rebuild cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Unchanged,
    Deployed,
    Failed,
    Cancelled,
}

struct Inner {
    config: Config,
    calculator: HashCalculator,
    pipeline: Pipeline,
    reporter: Arc<dyn Reporter>,
    debounce_window: Duration,
    state: Mutex<CycleState>,
    shutdown: CancellationToken,
}

/// Owns the watch loop for one project. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        pipeline: Pipeline,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, DaemonError> {
        let exclusions = Exclusions::new(&config.build_context_exclusions)?;
        let calculator = HashCalculator::new(config.project_root.clone(), exclusions);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                calculator,
                pipeline,
                reporter,
                debounce_window: DEFAULT_DEBOUNCE_WINDOW,
                state: Mutex::new(CycleState::default()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Override the debounce window. Only valid before the first clone.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.debounce_window = window;
        }
        self
    }

    /// Watch and rebuild until `cancel` fires or [`close`](Self::close) is
    /// called. A clean stop returns `Ok(())`.
    ///
    /// Fails up front when the baseline digest cannot be computed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), DaemonError> {
        let token = cancel.child_token();
        let result = self.run_until(&token).await;
        token.cancel();
        result
    }

    async fn run_until(&self, token: &CancellationToken) -> Result<(), DaemonError> {
        let inner = &self.inner;
        let baseline = inner.compute_digest().await?;
        inner.state.lock().last_digest = Some(baseline.clone());

        let watcher = FileWatcher::new(&inner.config.project_root, inner.calculator.exclusions().clone())?;
        let events = watcher.watch(token)?;
        let mut batches = Debouncer::new(inner.debounce_window).debounce(events, token.clone());
        inner.reporter.watching(watcher.root(), &baseline);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = inner.shutdown.cancelled() => break,
                batch = batches.recv() => match batch {
                    Some(batch) => {
                        self.handle_batch(batch, token);
                    }
                    None if token.is_cancelled() || inner.shutdown.is_cancelled() => break,
                    None => return Err(DaemonError::ChannelClosed("file watcher")),
                },
            }
        }
        tracing::info!("watch loop stopped");
        Ok(())
    }

    /// Stop a running [`run`](Self::run) and cancel any in-flight cycle.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }

    /// React to one batch: start a cycle, or mark one as queued when a cycle
    /// is already running. Returns whether a new cycle was started.
    pub fn handle_batch(&self, batch: EventBatch, cancel: &CancellationToken) -> bool {
        self.inner.reporter.changes(&batch);
        {
            let mut state = self.inner.state.lock();
            if state.in_flight {
                state.queued = true;
                tracing::debug!(events = batch.len(), "rebuild in flight, queued follow-up");
                return false;
            }
            state.in_flight = true;
        }

        let inner = Arc::clone(&self.inner);
        let cancel = cancel.clone();
        tokio::spawn(async move { inner.rebuild_loop(cancel).await });
        true
    }

    /// Whether a cycle is running right now.
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Digest of the last completed cycle (or the startup baseline).
    pub fn last_digest(&self) -> Option<SourceDigest> {
        self.inner.state.lock().last_digest.clone()
    }
}

impl Inner {
    async fn rebuild_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let outcome = self.run_cycle(&cancel).await;
            tracing::debug!(?outcome, "cycle finished");

            let mut state = self.state.lock();
            if state.queued && !cancel.is_cancelled() && !self.shutdown.is_cancelled() {
                state.queued = false;
                continue;
            }
            state.queued = false;
            state.in_flight = false;
            break;
        }
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let digest = match self.compute_digest().await {
            Ok(digest) => digest,
            Err(err) => {
                self.reporter.failed(&err);
                return CycleOutcome::Failed;
            }
        };

        let previous = self.state.lock().last_digest.clone();
        if previous.as_ref() == Some(&digest) {
            self.reporter.unchanged(&digest);
            return CycleOutcome::Unchanged;
        }
        self.reporter.rebuilding(previous.as_ref(), &digest);

        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return CycleOutcome::Cancelled,
            result = self.pipeline.build_and_deploy(&self.config, &digest, cancel) => result,
        };
        if matches!(&result, Err(err) if err.is_cancelled()) {
            return CycleOutcome::Cancelled;
        }

        self.state.lock().last_digest = Some(digest);
        match result {
            Ok(summary) => {
                self.reporter.deployed(&summary);
                CycleOutcome::Deployed
            }
            Err(err) => {
                self.reporter.failed(&err);
                CycleOutcome::Failed
            }
        }
    }

    async fn compute_digest(&self) -> Result<SourceDigest, DaemonError> {
        let calculator = self.calculator.clone();
        tokio::task::spawn_blocking(move || calculator.calculate())
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))?
            .map_err(DaemonError::from)
    }
}
