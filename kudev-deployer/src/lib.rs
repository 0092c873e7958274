//! # kudev-deployer
//!
//! Reconciles a [`DesiredWorkloadState`](kudev_core::DesiredWorkloadState)
//! against a Kubernetes cluster: namespace, Deployment and Service upserts,
//! health classification, idempotent deletes and readiness polling.
//!
//! All cluster access goes through [`ClusterApi`]; [`KubeCluster`] is the
//! `kube`-backed implementation.

pub mod cluster;
pub mod deployer;
pub mod error;
pub mod merge;
pub mod status;

pub use cluster::{current_context, ClusterApi, KubeCluster};
pub use deployer::{ClusterDeployer, Deployer, DEFAULT_POLL_INTERVAL};
pub use error::{ClusterError, DeleteFailure, DeployError};
pub use status::{compute_status_code, observe, CRASH_LOOP_RESTARTS};
