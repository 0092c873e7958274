//! Thin seam over the Kubernetes API.
//!
//! [`ClusterApi`] covers exactly the calls the reconciler makes. Missing
//! objects come back as `Ok(None)` from `get_*`; every other failure is a
//! classified [`ClusterError`]. [`KubeCluster`] is the real implementation.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;

use crate::error::ClusterError;

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError>;

    /// Full replace. `deployment` must carry the live `resourceVersion`.
    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError>;

    /// Foreground deletion: dependents go before the owner.
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, ClusterError>;

    async fn get_service(&self, namespace: &str, name: &str)
        -> Result<Option<Service>, ClusterError>;

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError>;

    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<Service, ClusterError>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    async fn list_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Service>, ClusterError>;

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, ClusterError>;
}

/// `current-context` of the local kubeconfig (`$KUBECONFIG` or `~/.kube/config`).
pub fn current_context() -> Result<String, ClusterError> {
    let kubeconfig = Kubeconfig::read().map_err(|e| ClusterError::Config(e.to_string()))?;
    kubeconfig
        .current_context
        .filter(|ctx| !ctx.is_empty())
        .ok_or_else(|| ClusterError::Config("kubeconfig has no current-context".into()))
}

// ---------------------------------------------------------------------------
// kube-rs implementation
// ---------------------------------------------------------------------------

/// [`ClusterApi`] backed by a `kube` client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the local kubeconfig, optionally pinned to `context`.
    ///
    /// With no context, falls back to in-cluster config or the kubeconfig's
    /// current context, like `kubectl`.
    pub async fn connect(context: Option<&str>) -> Result<Self, ClusterError> {
        let client = match context {
            None => Client::try_default()
                .await
                .map_err(|e| ClusterError::Config(e.to_string()))?,
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                let config = kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| ClusterError::Config(format!("context {context}: {e}")))?;
                Client::try_from(config).map_err(|e| ClusterError::Config(e.to_string()))?
            }
        };
        tracing::debug!(context = context.unwrap_or("<current>"), "connected to cluster");
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError> {
        Ok(self.deployments(namespace).get_opt(name).await?)
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        Ok(self
            .deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await?)
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        Ok(self
            .deployments(namespace)
            .replace(name, &PostParams::default(), deployment)
            .await?)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.deployments(namespace)
            .delete(name, &DeleteParams::foreground())
            .await?;
        Ok(())
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, ClusterError> {
        let list = self
            .deployments(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ClusterError> {
        Ok(self.services(namespace).get_opt(name).await?)
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        Ok(self
            .services(namespace)
            .create(&PostParams::default(), service)
            .await?)
    }

    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        Ok(self
            .services(namespace)
            .replace(name, &PostParams::default(), service)
            .await?)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.services(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn list_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Service>, ClusterError> {
        let list = self
            .services(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        namespaces.create(&PostParams::default(), &ns).await?;
        tracing::info!(namespace = %name, "created namespace");
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }
}
