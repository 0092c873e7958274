//! Reconciliation engine: converge the cluster toward a
//! [`DesiredWorkloadState`] and report what it looks like.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use kudev_core::{DesiredWorkloadState, ObservedStatus, StatusCode};
use kudev_renderer::{managed_selector, Renderer, TemplateData, LABEL_APP};

use crate::cluster::ClusterApi;
use crate::error::{ClusterError, DeleteFailure, DeployError};
use crate::merge::{merge_deployment, preserve_service_fields};
use crate::status::observe;

/// Fixed interval between readiness / deletion polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Namespace that always exists and is never created.
const DEFAULT_NAMESPACE: &str = "default";

/// Attempts at a read-merge-replace before a write conflict is surfaced.
const MAX_CONFLICT_RETRIES: usize = 3;

/// Cluster-facing half of a rebuild cycle.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Create or update the Deployment and Service (and namespace), then
    /// return the resulting status.
    async fn upsert(&self, desired: &DesiredWorkloadState) -> Result<ObservedStatus, DeployError>;

    async fn status(&self, app_name: &str, namespace: &str)
        -> Result<ObservedStatus, DeployError>;

    /// Delete the Deployment and Service. Missing objects are not an error.
    async fn delete(&self, app_name: &str, namespace: &str) -> Result<(), DeployError>;

    /// Delete every kudev-managed Deployment and Service in `namespace`.
    /// Returns how many objects were removed.
    async fn delete_managed(&self, namespace: &str) -> Result<usize, DeployError>;

    async fn wait_for_ready(
        &self,
        app_name: &str,
        namespace: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ObservedStatus, DeployError>;

    async fn wait_for_deletion(
        &self,
        app_name: &str,
        namespace: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DeployError>;
}

/// [`Deployer`] that renders manifests and applies them through a
/// [`ClusterApi`].
pub struct ClusterDeployer<C> {
    cluster: C,
    renderer: Renderer,
    poll_interval: Duration,
}

impl<C: ClusterApi> ClusterDeployer<C> {
    pub fn new(cluster: C, renderer: Renderer) -> Self {
        Self {
            cluster,
            renderer,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), DeployError> {
        if namespace == DEFAULT_NAMESPACE {
            return Ok(());
        }
        match self.cluster.create_namespace(namespace).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_deployment(
        &self,
        namespace: &str,
        name: &str,
        rendered: &Deployment,
    ) -> Result<(), DeployError> {
        let mut last_err = None;
        for _ in 0..MAX_CONFLICT_RETRIES {
            let result = match self.cluster.get_deployment(namespace, name).await? {
                None => self
                    .cluster
                    .create_deployment(namespace, rendered)
                    .await
                    .map(|_| tracing::info!(%namespace, %name, "created deployment")),
                Some(mut live) => {
                    merge_deployment(&mut live, rendered);
                    self.cluster
                        .replace_deployment(namespace, name, &live)
                        .await
                        .map(|_| tracing::info!(%namespace, %name, "updated deployment"))
                }
            };
            match result {
                Ok(()) => return Ok(()),
                // Someone else created or changed it between our read and write.
                Err(e @ (ClusterError::AlreadyExists(_) | ClusterError::Conflict(_))) => {
                    tracing::debug!(%namespace, %name, error = %e, "deployment write raced, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| ClusterError::Conflict(format!("deployment {name}")))
            .into())
    }

    async fn upsert_service(
        &self,
        namespace: &str,
        name: &str,
        rendered: &Service,
    ) -> Result<(), DeployError> {
        let mut last_err = None;
        for _ in 0..MAX_CONFLICT_RETRIES {
            let result = match self.cluster.get_service(namespace, name).await? {
                None => self
                    .cluster
                    .create_service(namespace, rendered)
                    .await
                    .map(|_| tracing::info!(%namespace, %name, "created service")),
                Some(live) => {
                    let mut desired = rendered.clone();
                    preserve_service_fields(&mut desired, &live);
                    self.cluster
                        .replace_service(namespace, name, &desired)
                        .await
                        .map(|_| tracing::info!(%namespace, %name, "updated service"))
                }
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e @ (ClusterError::AlreadyExists(_) | ClusterError::Conflict(_))) => {
                    tracing::debug!(%namespace, %name, error = %e, "service write raced, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| ClusterError::Conflict(format!("service {name}")))
            .into())
    }

    /// Poll `check` until it yields a value, `timeout` elapses or `cancel`
    /// fires. Transient cluster errors are logged and polled through.
    async fn poll<T, F, Fut>(
        &self,
        what: String,
        timeout: Duration,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<T, DeployError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Probe<T>, DeployError>> + Send,
        T: Send,
    {
        let deadline = Instant::now() + timeout;
        let mut last = None;
        loop {
            if cancel.is_cancelled() {
                return Err(DeployError::Cancelled);
            }
            match check().await {
                Ok(Probe::Done(value)) => return Ok(value),
                Ok(Probe::Waiting(status)) => last = status,
                Err(DeployError::Cluster(e)) if e.is_transient() => {
                    tracing::warn!(error = %e, "transient error while waiting for {what}");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DeployError::Timeout {
                    what,
                    waited: timeout,
                    last,
                });
            }
            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

/// One poll outcome: finished, or still waiting with an optional status note.
enum Probe<T> {
    Done(T),
    Waiting(Option<String>),
}

#[async_trait]
impl<C: ClusterApi> Deployer for ClusterDeployer<C> {
    async fn upsert(&self, desired: &DesiredWorkloadState) -> Result<ObservedStatus, DeployError> {
        let data = TemplateData::from_desired(desired);
        let deployment = self.renderer.render_deployment(&data)?;
        let service = self.renderer.render_service(&data)?;
        let (name, namespace) = (desired.app_name.as_str(), desired.namespace.as_str());

        self.ensure_namespace(namespace).await?;
        self.upsert_deployment(namespace, name, &deployment).await?;
        self.upsert_service(namespace, name, &service).await?;
        self.status(name, namespace).await
    }

    async fn status(
        &self,
        app_name: &str,
        namespace: &str,
    ) -> Result<ObservedStatus, DeployError> {
        let deployment = self
            .cluster
            .get_deployment(namespace, app_name)
            .await?
            .ok_or_else(|| DeployError::NotFound {
                kind: "Deployment",
                name: app_name.to_string(),
                namespace: namespace.to_string(),
            })?;
        let pods = self
            .cluster
            .list_pods(namespace, &format!("{LABEL_APP}={app_name}"))
            .await?;
        Ok(observe(&deployment, &pods))
    }

    async fn delete(&self, app_name: &str, namespace: &str) -> Result<(), DeployError> {
        let mut failures = Vec::new();

        match self.cluster.delete_deployment(namespace, app_name).await {
            Ok(()) => tracing::info!(%namespace, name = %app_name, "deleted deployment"),
            Err(e) if e.is_not_found() => {}
            Err(source) => failures.push(DeleteFailure {
                kind: "Deployment",
                name: app_name.to_string(),
                source,
            }),
        }
        match self.cluster.delete_service(namespace, app_name).await {
            Ok(()) => tracing::info!(%namespace, name = %app_name, "deleted service"),
            Err(e) if e.is_not_found() => {}
            Err(source) => failures.push(DeleteFailure {
                kind: "Service",
                name: app_name.to_string(),
                source,
            }),
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DeployError::Partial(failures))
        }
    }

    async fn delete_managed(&self, namespace: &str) -> Result<usize, DeployError> {
        let selector = managed_selector();
        let mut failures = Vec::new();
        let mut deleted = 0;

        for deployment in self.cluster.list_deployments(namespace, &selector).await? {
            let Some(name) = deployment.metadata.name else { continue };
            match self.cluster.delete_deployment(namespace, &name).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(source) => failures.push(DeleteFailure { kind: "Deployment", name, source }),
            }
        }
        for service in self.cluster.list_services(namespace, &selector).await? {
            let Some(name) = service.metadata.name else { continue };
            match self.cluster.delete_service(namespace, &name).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(source) => failures.push(DeleteFailure { kind: "Service", name, source }),
            }
        }

        tracing::info!(%namespace, deleted, failed = failures.len(), "deleted managed resources");
        if failures.is_empty() {
            Ok(deleted)
        } else {
            Err(DeployError::Partial(failures))
        }
    }

    async fn wait_for_ready(
        &self,
        app_name: &str,
        namespace: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ObservedStatus, DeployError> {
        self.poll(
            format!("deployment {namespace}/{app_name} to become ready"),
            timeout,
            cancel,
            || async move {
                match self.status(app_name, namespace).await {
                    Ok(status) if status.status_code == StatusCode::Running => {
                        Ok(Probe::Done(status))
                    }
                    Ok(status) => Ok(Probe::Waiting(Some(status.message))),
                    Err(e) if e.is_not_found() => Ok(Probe::Waiting(None)),
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    async fn wait_for_deletion(
        &self,
        app_name: &str,
        namespace: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DeployError> {
        self.poll(
            format!("deployment {namespace}/{app_name} to be deleted"),
            timeout,
            cancel,
            || async move {
                match self.cluster.get_deployment(namespace, app_name).await? {
                    None => Ok(Probe::Done(())),
                    Some(_) => Ok(Probe::Waiting(Some("deployment still present".into()))),
                }
            },
        )
        .await
    }
}
