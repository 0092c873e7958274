//! In-memory [`ClusterApi`] with API-server-like behaviour for the pieces the
//! reconciler relies on: create conflicts, resourceVersion checks, immutable
//! cluster IPs and namespace existence.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use parking_lot::Mutex;

use kudev_core::{DesiredWorkloadState, EnvVar};
use kudev_deployer::{ClusterApi, ClusterError};

type Key = (String, String);

#[derive(Default)]
pub struct State {
    pub deployments: BTreeMap<Key, Deployment>,
    pub services: BTreeMap<Key, Service>,
    pub namespaces: BTreeSet<String>,
    pub pods: Vec<(String, Pod)>,
    pub namespace_creates: usize,
    pub deployment_conflicts: usize,
    pub delete_failures: BTreeMap<&'static str, ClusterError>,
    next_ip: u8,
    version: u64,
}

impl State {
    fn bump(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    pub state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().namespaces.insert("default".into());
        fake
    }

    pub fn set_ready(&self, namespace: &str, name: &str, ready: i32) {
        let mut state = self.state.lock();
        if let Some(d) = state.deployments.get_mut(&key(namespace, name)) {
            d.status = Some(DeploymentStatus {
                ready_replicas: Some(ready),
                ..Default::default()
            });
        }
    }

    pub fn add_pod(&self, namespace: &str, pod: Pod) {
        self.state.lock().pods.push((namespace.to_string(), pod));
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.state.lock().deployments.get(&key(namespace, name)).cloned()
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.state.lock().services.get(&key(namespace, name)).cloned()
    }

    fn require_namespace(state: &State, namespace: &str) -> Result<(), ClusterError> {
        if state.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(ClusterError::NotFound(format!("namespaces \"{namespace}\" not found")))
        }
    }
}

pub fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn matches_selector(meta: &ObjectMeta, selector: &str) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector.split(',').filter(|s| !s.is_empty()).all(|pair| {
        pair.split_once('=')
            .is_some_and(|(k, v)| labels.get(k).map(String::as_str) == Some(v))
    })
}

fn stamp(meta: &mut ObjectMeta, namespace: &str, version: String) {
    meta.namespace = Some(namespace.to_string());
    meta.resource_version = Some(version);
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ClusterError> {
        Ok(self.deployment(namespace, name))
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let mut state = self.state.lock();
        Self::require_namespace(&state, namespace)?;
        let name = deployment.metadata.name.clone().unwrap_or_default();
        if state.deployments.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::AlreadyExists(format!("deployments \"{name}\"")));
        }
        let mut created = deployment.clone();
        let version = state.bump();
        stamp(&mut created.metadata, namespace, version);
        state.deployments.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        name: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, ClusterError> {
        let mut state = self.state.lock();
        if state.deployment_conflicts > 0 {
            state.deployment_conflicts -= 1;
            let version = state.bump();
            if let Some(live) = state.deployments.get_mut(&key(namespace, name)) {
                live.metadata.resource_version = Some(version);
            }
            return Err(ClusterError::Conflict("the object has been modified".into()));
        }
        let live = state
            .deployments
            .get(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("deployments \"{name}\"")))?;
        if live.metadata.resource_version != deployment.metadata.resource_version {
            return Err(ClusterError::Conflict("stale resourceVersion".into()));
        }
        let mut updated = deployment.clone();
        let version = state.bump();
        stamp(&mut updated.metadata, namespace, version);
        state.deployments.insert(key(namespace, name), updated.clone());
        Ok(updated)
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.delete_failures.get("Deployment") {
            return Err(err.clone());
        }
        state
            .deployments
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound(format!("deployments \"{name}\"")))
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Deployment>, ClusterError> {
        let state = self.state.lock();
        Ok(state
            .deployments
            .iter()
            .filter(|((ns, _), d)| ns == namespace && matches_selector(&d.metadata, selector))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, ClusterError> {
        Ok(self.service(namespace, name))
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        let mut state = self.state.lock();
        Self::require_namespace(&state, namespace)?;
        let name = service.metadata.name.clone().unwrap_or_default();
        if state.services.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::AlreadyExists(format!("services \"{name}\"")));
        }
        state.next_ip += 1;
        let ip = format!("10.96.0.{}", state.next_ip);
        let mut created = service.clone();
        if let Some(spec) = created.spec.as_mut() {
            spec.cluster_ip = Some(ip.clone());
            spec.cluster_ips = Some(vec![ip]);
        }
        let version = state.bump();
        stamp(&mut created.metadata, namespace, version);
        state.services.insert(key(namespace, &name), created.clone());
        Ok(created)
    }

    async fn replace_service(
        &self,
        namespace: &str,
        name: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        let mut state = self.state.lock();
        let live = state
            .services
            .get(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("services \"{name}\"")))?;
        if live.metadata.resource_version != service.metadata.resource_version {
            return Err(ClusterError::Conflict("stale resourceVersion".into()));
        }
        let live_ip = live.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        let new_ip = service.spec.as_ref().and_then(|s| s.cluster_ip.clone());
        if live_ip != new_ip {
            return Err(ClusterError::Api {
                code: 422,
                reason: "Invalid".into(),
                message: "spec.clusterIP: Invalid value: field is immutable".into(),
            });
        }
        let mut updated = service.clone();
        let version = state.bump();
        stamp(&mut updated.metadata, namespace, version);
        state.services.insert(key(namespace, name), updated.clone());
        Ok(updated)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        if let Some(err) = state.delete_failures.get("Service") {
            return Err(err.clone());
        }
        state
            .services
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound(format!("services \"{name}\"")))
    }

    async fn list_services(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<Service>, ClusterError> {
        let state = self.state.lock();
        Ok(state
            .services
            .iter()
            .filter(|((ns, _), s)| ns == namespace && matches_selector(&s.metadata, selector))
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state.lock();
        state.namespace_creates += 1;
        if !state.namespaces.insert(name.to_string()) {
            return Err(ClusterError::AlreadyExists(format!("namespaces \"{name}\"")));
        }
        Ok(())
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let state = self.state.lock();
        Ok(state
            .pods
            .iter()
            .filter(|(ns, p)| ns == namespace && matches_selector(&p.metadata, selector))
            .map(|(_, p)| p.clone())
            .collect())
    }
}

pub fn desired(namespace: &str, digest: &str) -> DesiredWorkloadState {
    DesiredWorkloadState {
        app_name: "api".into(),
        namespace: namespace.into(),
        image_ref: format!("api:kudev-{digest}"),
        image_digest_label: digest.into(),
        replicas: 1,
        service_port: 8080,
        env: vec![EnvVar {
            name: "MODE".into(),
            value: "dev".into(),
        }],
    }
}
