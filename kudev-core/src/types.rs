//! Domain types shared by the hashing, watching and reconciliation crates.
//!
//! Everything here is recomputed on demand: digests come from the filesystem,
//! observed status comes from the cluster. Nothing is persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Short content digest of a source tree (8 lowercase hex characters).
///
/// Equality between two digests means "no rebuild needed".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDigest(pub String);

impl SourceDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceDigest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceDigest {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// File change events
// ---------------------------------------------------------------------------

/// Semantic classification of a filesystem notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Write,
    Create,
    Delete,
    Rename,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperation::Write => write!(f, "write"),
            FileOperation::Create => write!(f, "create"),
            FileOperation::Delete => write!(f, "delete"),
            FileOperation::Rename => write!(f, "rename"),
        }
    }
}

/// One change observed under the watched root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// Path relative to the watched root, `/`-separated.
    pub path: String,
    pub operation: FileOperation,
    pub observed_at: DateTime<Utc>,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<String>, operation: FileOperation) -> Self {
        Self {
            path: path.into(),
            operation,
            observed_at: Utc::now(),
        }
    }
}

/// Events collected within one debounce window, in arrival order.
pub type EventBatch = Vec<FileChangeEvent>;

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

/// A single container environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Workload state the reconciler converges the cluster toward.
///
/// Derived every cycle from config plus the freshly built image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredWorkloadState {
    pub app_name: String,
    pub namespace: String,
    pub image_ref: String,
    pub image_digest_label: String,
    pub replicas: i32,
    pub service_port: u16,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

// ---------------------------------------------------------------------------
// Observed state
// ---------------------------------------------------------------------------

/// Health of a deployment, derived from replica counts and pod restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    Running,
    Pending,
    Degraded,
    Failed,
    Unknown,
}

impl StatusCode {
    /// Human-readable message for this code.
    pub fn message(&self, ready: i32, desired: i32) -> String {
        match self {
            StatusCode::Running => format!("all {desired} replica(s) ready"),
            StatusCode::Pending => format!("waiting for pods to become ready (0/{desired})"),
            StatusCode::Degraded => format!("{ready}/{desired} replica(s) ready"),
            StatusCode::Failed => "pods are crash-looping; check logs".to_string(),
            StatusCode::Unknown => "deployment has no desired replicas".to_string(),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Running => write!(f, "running"),
            StatusCode::Pending => write!(f, "pending"),
            StatusCode::Degraded => write!(f, "degraded"),
            StatusCode::Failed => write!(f, "failed"),
            StatusCode::Unknown => write!(f, "unknown"),
        }
    }
}

/// Per-pod slice of an [`ObservedStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub name: String,
    pub phase: String,
    pub ready: bool,
    pub restarts: i32,
    /// Most recent waiting/terminated reason and message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Deployment health as seen by the cluster at the moment of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedStatus {
    pub deployment_name: String,
    pub namespace: String,
    pub ready_replicas: i32,
    pub desired_replicas: i32,
    pub status_code: StatusCode,
    #[serde(default)]
    pub pods: Vec<PodStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_digest_label: Option<String>,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
