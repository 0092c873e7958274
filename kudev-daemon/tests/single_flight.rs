use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use kudev_core::{Config, DesiredWorkloadState, EventBatch, FileChangeEvent, FileOperation, ObservedStatus, SourceDigest, StatusCode};
use kudev_daemon::{
    BuildError, BuildRequest, Builder, BuiltImage, CommandError, DaemonError, DeploySummary,
    ImageLoader, LoadError, Orchestrator, Pipeline, Reporter,
};
use kudev_deployer::{DeployError, Deployer};
use kudev_hash::HashError;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct GatedBuilder {
    calls: AtomicUsize,
    fail: AtomicBool,
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Builder for GatedBuilder {
    async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuiltImage, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.started.send(request.image_ref());
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CommandError::Cancelled { program: "docker".into() }.into());
            }
            permit = self.gate.acquire() => permit.expect("gate open").forget(),
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CommandError::Failed {
                program: "docker".into(),
                status: Some(1),
                stderr: "COPY failed".into(),
            }
            .into());
        }
        Ok(BuiltImage {
            full_ref: request.image_ref(),
            id: "sha256:feed".into(),
            digest: request.digest.clone(),
        })
    }
}

#[derive(Default)]
struct CountingLoader {
    loads: AtomicUsize,
}

#[async_trait]
impl ImageLoader for CountingLoader {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn load(&self, _image_ref: &str, _cancel: &CancellationToken) -> Result<(), LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDeployer {
    upserts: Mutex<Vec<DesiredWorkloadState>>,
}

fn running(name: &str, namespace: &str) -> ObservedStatus {
    ObservedStatus {
        deployment_name: name.into(),
        namespace: namespace.into(),
        ready_replicas: 1,
        desired_replicas: 1,
        status_code: StatusCode::Running,
        pods: vec![],
        image_digest_label: None,
        message: StatusCode::Running.message(1, 1),
        observed_at: Utc::now(),
    }
}

#[async_trait]
impl Deployer for RecordingDeployer {
    async fn upsert(&self, desired: &DesiredWorkloadState) -> Result<ObservedStatus, DeployError> {
        self.upserts.lock().push(desired.clone());
        Ok(running(&desired.app_name, &desired.namespace))
    }

    async fn status(&self, app_name: &str, namespace: &str) -> Result<ObservedStatus, DeployError> {
        Ok(running(app_name, namespace))
    }

    async fn delete(&self, _app_name: &str, _namespace: &str) -> Result<(), DeployError> {
        Ok(())
    }

    async fn delete_managed(&self, _namespace: &str) -> Result<usize, DeployError> {
        Ok(0)
    }

    async fn wait_for_ready(
        &self,
        app_name: &str,
        namespace: &str,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<ObservedStatus, DeployError> {
        Ok(running(app_name, namespace))
    }

    async fn wait_for_deletion(
        &self,
        _app_name: &str,
        _namespace: &str,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<(), DeployError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReporter {
    log: Mutex<Vec<&'static str>>,
}

impl RecordingReporter {
    fn count(&self, what: &str) -> usize {
        self.log.lock().iter().filter(|e| **e == what).count()
    }
}

impl Reporter for RecordingReporter {
    fn watching(&self, _root: &Path, _digest: &SourceDigest) {
        self.log.lock().push("watching");
    }
    fn changes(&self, _batch: &EventBatch) {
        self.log.lock().push("changes");
    }
    fn unchanged(&self, _digest: &SourceDigest) {
        self.log.lock().push("unchanged");
    }
    fn rebuilding(&self, _previous: Option<&SourceDigest>, _next: &SourceDigest) {
        self.log.lock().push("rebuilding");
    }
    fn deployed(&self, _summary: &DeploySummary) {
        self.log.lock().push("deployed");
    }
    fn failed(&self, _error: &DaemonError) {
        self.log.lock().push("failed");
    }
}

struct Harness {
    tmp: TempDir,
    orchestrator: Orchestrator,
    builder: Arc<GatedBuilder>,
    deployer: Arc<RecordingDeployer>,
    reporter: Arc<RecordingReporter>,
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedReceiver<String>,
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("main.go"), "package main").unwrap();

    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, started) = mpsc::unbounded_channel();
    let builder = Arc::new(GatedBuilder {
        calls: AtomicUsize::new(0),
        fail: AtomicBool::new(false),
        gate: gate.clone(),
        started: started_tx,
    });
    let deployer = Arc::new(RecordingDeployer::default());
    let reporter = Arc::new(RecordingReporter::default());
    let pipeline = Pipeline::new(
        builder.clone(),
        Arc::new(CountingLoader::default()),
        deployer.clone(),
    );
    let orchestrator = Orchestrator::new(Config::new("api", tmp.path()), pipeline, reporter.clone())
        .unwrap()
        .with_debounce_window(Duration::from_millis(100));

    Harness {
        tmp,
        orchestrator,
        builder,
        deployer,
        reporter,
        gate,
        started,
    }
}

fn batch(path: &str) -> EventBatch {
    vec![FileChangeEvent::new(path, FileOperation::Write)]
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn five_batches_during_a_rebuild_cause_exactly_one_follow_up() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    assert!(h.orchestrator.handle_batch(batch("main.go"), &cancel));
    h.started.recv().await.expect("first build started");

    fs::write(h.tmp.path().join("main.go"), "package main // edited").unwrap();
    for _ in 0..5 {
        assert!(!h.orchestrator.handle_batch(batch("main.go"), &cancel));
    }

    h.gate.add_permits(10);
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;

    assert_eq!(h.builder.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.reporter.count("rebuilding"), 2);
    assert_eq!(h.reporter.count("deployed"), 2);
    assert_eq!(h.deployer.upserts.lock().len(), 2);
}

#[tokio::test]
async fn follow_up_on_unchanged_source_skips_the_build() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    h.orchestrator.handle_batch(batch("main.go"), &cancel);
    h.started.recv().await.unwrap();
    for _ in 0..3 {
        h.orchestrator.handle_batch(batch("main.go"), &cancel);
    }
    h.gate.add_permits(10);
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;

    assert_eq!(h.builder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.reporter.count("unchanged"), 1);
}

#[tokio::test]
async fn deployed_workload_uses_the_new_digest() {
    let mut h = harness();
    let cancel = CancellationToken::new();
    h.gate.add_permits(1);

    h.orchestrator.handle_batch(batch("main.go"), &cancel);
    let image_ref = h.started.recv().await.unwrap();
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;

    let digest = h.orchestrator.last_digest().expect("baseline committed");
    assert_eq!(image_ref, format!("api:kudev-{digest}"));
    let upserts = h.deployer.upserts.lock();
    assert_eq!(upserts[0].image_ref, image_ref);
    assert_eq!(upserts[0].image_digest_label, digest.as_str());
}

#[tokio::test]
async fn failed_cycle_commits_baseline_and_keeps_going() {
    let mut h = harness();
    let cancel = CancellationToken::new();
    h.builder.fail.store(true, Ordering::SeqCst);
    h.gate.add_permits(10);

    h.orchestrator.handle_batch(batch("main.go"), &cancel);
    h.started.recv().await.unwrap();
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;
    assert_eq!(h.reporter.count("failed"), 1);
    assert!(h.orchestrator.last_digest().is_some());

    // Same content: no automatic retry.
    h.orchestrator.handle_batch(batch("main.go"), &cancel);
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;
    assert_eq!(h.builder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.reporter.count("unchanged"), 1);

    // New content: rebuilt.
    h.builder.fail.store(false, Ordering::SeqCst);
    fs::write(h.tmp.path().join("main.go"), "package main // fixed").unwrap();
    h.orchestrator.handle_batch(batch("main.go"), &cancel);
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;
    assert_eq!(h.reporter.count("deployed"), 1);
}

#[tokio::test]
async fn cancelled_cycle_leaves_baseline_untouched() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    h.orchestrator.handle_batch(batch("main.go"), &cancel);
    h.started.recv().await.unwrap();
    cancel.cancel();
    wait_until("orchestrator idle", || !h.orchestrator.is_busy()).await;

    assert!(h.orchestrator.last_digest().is_none());
    assert_eq!(h.reporter.count("failed"), 0);
}

#[tokio::test]
async fn run_rebuilds_on_change_and_stops_cleanly() {
    let h = harness();
    h.gate.add_permits(10);
    let cancel = CancellationToken::new();

    let orchestrator = h.orchestrator.clone();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { orchestrator.run(token).await });

    wait_until("watch loop started", || h.reporter.count("watching") == 1).await;
    let baseline = h.orchestrator.last_digest().expect("baseline");

    fs::write(h.tmp.path().join("handler.go"), "package main\nfunc h() {}").unwrap();
    wait_until("deploy after change", || h.reporter.count("deployed") == 1).await;
    assert_ne!(h.orchestrator.last_digest(), Some(baseline));

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run returns")
        .expect("task joins");
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn close_stops_run() {
    let h = harness();
    let orchestrator = h.orchestrator.clone();
    let handle = tokio::spawn(async move { orchestrator.run(CancellationToken::new()).await });

    wait_until("watch loop started", || h.reporter.count("watching") == 1).await;
    h.orchestrator.close();

    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run returns")
        .expect("task joins");
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn run_fails_without_a_baseline() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(".git")).unwrap();
    fs::write(tmp.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();

    let (started, _rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline::new(
        Arc::new(GatedBuilder {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            gate: Arc::new(Semaphore::new(0)),
            started,
        }),
        Arc::new(CountingLoader::default()),
        Arc::new(RecordingDeployer::default()),
    );
    let orchestrator = Orchestrator::new(
        Config::new("api", tmp.path()),
        pipeline,
        Arc::new(RecordingReporter::default()),
    )
    .unwrap();

    let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, DaemonError::Hash(HashError::NoFiles { .. })), "{err}");
}
