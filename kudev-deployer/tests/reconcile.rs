mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_util::sync::CancellationToken;

use kudev_core::StatusCode;
use kudev_deployer::{ClusterDeployer, ClusterError, Deployer, DeployError};
use kudev_renderer::{Renderer, LABEL_APP, LABEL_HASH, LABEL_MANAGED_BY};

use common::{desired, key, FakeCluster};

fn deployer(fake: &FakeCluster) -> ClusterDeployer<FakeCluster> {
    ClusterDeployer::new(fake.clone(), Renderer::new().expect("embedded templates"))
}

fn cluster_ip(fake: &FakeCluster, namespace: &str) -> Option<String> {
    fake.service(namespace, "api")
        .and_then(|s| s.spec)
        .and_then(|s| s.cluster_ip)
}

// ---------------------------------------------------------------------------
// Upsert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_creates_namespace_deployment_and_service() {
    let fake = FakeCluster::new();
    let status = deployer(&fake)
        .upsert(&desired("dev", "a1b2c3d4"))
        .await
        .expect("upsert");

    assert!(fake.state.lock().namespaces.contains("dev"));
    let deployment = fake.deployment("dev", "api").expect("deployment created");
    let labels = deployment.metadata.labels.unwrap();
    assert_eq!(labels[LABEL_HASH], "a1b2c3d4");
    assert_eq!(labels[LABEL_MANAGED_BY], "kudev");
    assert!(cluster_ip(&fake, "dev").is_some());

    assert_eq!(status.deployment_name, "api");
    assert_eq!(status.status_code, StatusCode::Pending);
    assert_eq!(status.image_digest_label.as_deref(), Some("a1b2c3d4"));
}

#[tokio::test]
async fn upsert_in_default_namespace_never_creates_it() {
    let fake = FakeCluster::new();
    deployer(&fake)
        .upsert(&desired("default", "a1b2c3d4"))
        .await
        .expect("upsert");
    assert_eq!(fake.state.lock().namespace_creates, 0);
}

#[tokio::test]
async fn upsert_tolerates_namespace_created_concurrently() {
    let fake = FakeCluster::new();
    fake.state.lock().namespaces.insert("dev".into());

    deployer(&fake)
        .upsert(&desired("dev", "a1b2c3d4"))
        .await
        .expect("AlreadyExists on namespace is success");
    assert_eq!(fake.state.lock().namespace_creates, 1);
}

#[tokio::test]
async fn repeated_upserts_keep_the_cluster_ip() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);

    d.upsert(&desired("dev", "a1b2c3d4")).await.expect("first upsert");
    let first_ip = cluster_ip(&fake, "dev");

    let mut next = desired("dev", "deadbeef");
    next.replicas = 3;
    d.upsert(&next).await.expect("second upsert");
    d.upsert(&next).await.expect("third upsert");

    assert_eq!(cluster_ip(&fake, "dev"), first_ip);
    let deployment = fake.deployment("dev", "api").unwrap();
    let spec = deployment.spec.unwrap();
    assert_eq!(spec.replicas, Some(3));
    let pod = spec.template.spec.unwrap();
    assert_eq!(pod.containers[0].image.as_deref(), Some("api:kudev-deadbeef"));
}

#[tokio::test]
async fn upsert_preserves_fields_it_does_not_own() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    {
        let mut state = fake.state.lock();
        let live = state.deployments.get_mut(&common::key("dev", "api")).unwrap();
        live.metadata.annotations = Some(BTreeMap::from([(
            "deployment.kubernetes.io/revision".to_string(),
            "4".to_string(),
        )]));
    }

    let mut next = desired("dev", "deadbeef");
    next.env.clear();
    d.upsert(&next).await.unwrap();

    let deployment = fake.deployment("dev", "api").unwrap();
    assert_eq!(
        deployment.metadata.annotations.unwrap()["deployment.kubernetes.io/revision"],
        "4"
    );
    let pod = deployment.spec.unwrap().template.spec.unwrap();
    assert!(pod.containers[0].env.is_none());
}

#[tokio::test]
async fn upsert_retries_after_a_write_conflict() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    fake.state.lock().deployment_conflicts = 1;
    d.upsert(&desired("dev", "deadbeef")).await.expect("retry succeeds");

    let labels = fake.deployment("dev", "api").unwrap().metadata.labels.unwrap();
    assert_eq!(labels[LABEL_HASH], "deadbeef");
}

#[tokio::test]
async fn upsert_gives_up_after_repeated_conflicts() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    fake.state.lock().deployment_conflicts = 10;
    let err = d.upsert(&desired("dev", "deadbeef")).await.unwrap_err();
    assert!(matches!(err, DeployError::Cluster(ClusterError::Conflict(_))), "{err}");
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_of_missing_deployment_is_not_found() {
    let fake = FakeCluster::new();
    let err = deployer(&fake).status("api", "dev").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn status_reports_running_once_replicas_are_ready() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();
    fake.set_ready("dev", "api", 1);
    fake.add_pod(
        "dev",
        Pod {
            metadata: ObjectMeta {
                name: Some("api-7d9f".into()),
                labels: Some(BTreeMap::from([(LABEL_APP.to_string(), "api".to_string())])),
                ..Default::default()
            },
            ..Default::default()
        },
    );

    let status = d.status("api", "dev").await.unwrap();
    assert_eq!(status.status_code, StatusCode::Running);
    assert_eq!(status.message, "all 1 replica(s) ready");
    assert_eq!(status.pods.len(), 1);
    assert_eq!(status.pods[0].name, "api-7d9f");
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_is_idempotent() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    d.delete("api", "dev").await.expect("first delete");
    d.delete("api", "dev").await.expect("second delete is a no-op");
    assert!(fake.deployment("dev", "api").is_none());
    assert!(fake.service("dev", "api").is_none());
}

#[tokio::test]
async fn delete_attempts_both_objects_and_aggregates_failures() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();
    fake.state.lock().delete_failures.insert(
        "Deployment",
        ClusterError::Transient("connection reset".into()),
    );

    let err = d.delete("api", "dev").await.unwrap_err();
    match err {
        DeployError::Partial(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].kind, "Deployment");
        }
        other => panic!("expected Partial, got {other}"),
    }
    assert!(fake.service("dev", "api").is_none(), "service still deleted");
}

#[tokio::test]
async fn delete_with_only_one_object_present_succeeds() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);

    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();
    fake.state.lock().deployments.remove(&key("dev", "api"));
    d.delete("api", "dev").await.expect("service only");
    assert!(fake.service("dev", "api").is_none());

    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();
    fake.state.lock().services.remove(&key("dev", "api"));
    d.delete("api", "dev").await.expect("deployment only");
    assert!(fake.deployment("dev", "api").is_none());
}

#[tokio::test]
async fn delete_reports_both_failures_together() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();
    {
        let mut state = fake.state.lock();
        state
            .delete_failures
            .insert("Deployment", ClusterError::Transient("connection reset".into()));
        state.delete_failures.insert(
            "Service",
            ClusterError::Api { code: 403, reason: "Forbidden".into(), message: "denied".into() },
        );
    }

    match d.delete("api", "dev").await.unwrap_err() {
        DeployError::Partial(failures) => {
            let kinds: Vec<_> = failures.iter().map(|f| f.kind).collect();
            assert_eq!(kinds, ["Deployment", "Service"]);
        }
        other => panic!("expected Partial, got {other}"),
    }
    assert!(fake.deployment("dev", "api").is_some());
    assert!(fake.service("dev", "api").is_some());
}

#[tokio::test]
async fn delete_managed_skips_foreign_resources() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    let mut foreign = fake.deployment("dev", "api").unwrap();
    foreign.metadata.name = Some("postgres".into());
    foreign.metadata.labels = Some(BTreeMap::from([(LABEL_APP.to_string(), "postgres".to_string())]));
    fake.state
        .lock()
        .deployments
        .insert(common::key("dev", "postgres"), foreign);

    let deleted = d.delete_managed("dev").await.unwrap();
    assert_eq!(deleted, 2);
    assert!(fake.deployment("dev", "postgres").is_some());
    assert!(fake.deployment("dev", "api").is_none());
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn wait_for_ready_returns_once_running() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    let background = fake.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        background.set_ready("dev", "api", 1);
    });

    let status = d
        .wait_for_ready("api", "dev", Duration::from_secs(60), &CancellationToken::new())
        .await
        .expect("ready before timeout");
    assert_eq!(status.status_code, StatusCode::Running);
}

#[tokio::test(start_paused = true)]
async fn wait_for_ready_times_out_with_last_status() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    let err = d
        .wait_for_ready("api", "dev", Duration::from_secs(10), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        DeployError::Timeout { waited, last, .. } => {
            assert_eq!(waited, Duration::from_secs(10));
            assert_eq!(last.as_deref(), Some("waiting for pods to become ready (0/1)"));
        }
        other => panic!("expected Timeout, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn wait_for_ready_stops_on_cancellation() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let err = d
        .wait_for_ready("api", "dev", Duration::from_secs(300), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn wait_for_deletion_succeeds_when_gone() {
    let fake = FakeCluster::new();
    let d = deployer(&fake);
    d.upsert(&desired("dev", "a1b2c3d4")).await.unwrap();
    d.delete("api", "dev").await.unwrap();

    d.wait_for_deletion("api", "dev", Duration::from_secs(30), &CancellationToken::new())
        .await
        .expect("already deleted");
}
