//! Deriving an [`ObservedStatus`] from live Deployment and Pod objects.

use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ContainerState, Pod};

use kudev_core::{ObservedStatus, PodStatus, StatusCode};
use kudev_renderer::LABEL_HASH;

/// Restart count above which a pod with no ready replicas is "crash-looping".
pub const CRASH_LOOP_RESTARTS: i32 = 3;

/// Classify a deployment from its replica counts and pod restarts.
///
/// Checked in order: no desired replicas, all ready, crash-looping, none
/// ready, some ready.
pub fn compute_status_code(ready: i32, desired: i32, pods: &[PodStatus]) -> StatusCode {
    if desired == 0 {
        return StatusCode::Unknown;
    }
    if ready >= desired {
        return StatusCode::Running;
    }
    if ready == 0 {
        if pods.iter().any(|p| p.restarts > CRASH_LOOP_RESTARTS) {
            return StatusCode::Failed;
        }
        return StatusCode::Pending;
    }
    StatusCode::Degraded
}

/// Build the full status snapshot for `deployment` and the pods it selects.
pub fn observe(deployment: &Deployment, pods: &[Pod]) -> ObservedStatus {
    // The API server defaults an unset replica count to 1.
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);

    let mut pods: Vec<PodStatus> = pods.iter().map(pod_status).collect();
    pods.sort_by(|a, b| a.name.cmp(&b.name));

    let status_code = compute_status_code(ready, desired, &pods);
    ObservedStatus {
        deployment_name: deployment.metadata.name.clone().unwrap_or_default(),
        namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
        ready_replicas: ready,
        desired_replicas: desired,
        status_code,
        image_digest_label: deployment
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LABEL_HASH))
            .cloned(),
        message: status_code.message(ready, desired),
        pods,
        observed_at: Utc::now(),
    }
}

/// Per-pod summary: phase, readiness, total restarts and the latest
/// diagnostic reason.
pub fn pod_status(pod: &Pod) -> PodStatus {
    let status = pod.status.as_ref();
    let containers = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);

    let message = containers.iter().find_map(|c| {
        c.state
            .as_ref()
            .and_then(describe_state)
            .or_else(|| c.last_state.as_ref().and_then(describe_state))
    });

    PodStatus {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase: status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        ready,
        restarts: containers.iter().map(|c| c.restart_count).sum(),
        message,
    }
}

fn describe_state(state: &ContainerState) -> Option<String> {
    let (reason, message) = if let Some(waiting) = &state.waiting {
        (waiting.reason.clone(), waiting.message.clone())
    } else if let Some(terminated) = &state.terminated {
        (terminated.reason.clone(), terminated.message.clone())
    } else {
        return None;
    };
    match (reason, message) {
        (Some(r), Some(m)) => Some(format!("{r}: {m}")),
        (Some(r), None) => Some(r),
        (None, Some(m)) => Some(m),
        (None, None) => None,
    }
}
