//! Error types for kudev-deployer.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use kudev_renderer::RenderError;

/// Classified failure from a single cluster API call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency conflict (stale resourceVersion).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Permanent rejection (validation, forbidden, immutable field, ...).
    #[error("cluster API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// Network failure, timeout or 5xx/429; retrying may succeed.
    #[error("transient cluster error: {0}")]
    Transient(String),

    /// Kubeconfig could not be loaded or the client could not be built.
    #[error("kubeconfig error: {0}")]
    Config(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ClusterError::Transient(_) | ClusterError::Conflict(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
                (404, _) => ClusterError::NotFound(resp.message),
                (409, "AlreadyExists") => ClusterError::AlreadyExists(resp.message),
                (409, _) => ClusterError::Conflict(resp.message),
                (code, _) if code == 429 || code >= 500 => ClusterError::Transient(format!(
                    "{} ({}): {}",
                    code, resp.reason, resp.message
                )),
                (code, _) => ClusterError::Api {
                    code,
                    reason: resp.reason,
                    message: resp.message,
                },
            },
            other => ClusterError::Transient(other.to_string()),
        }
    }
}

/// One resource that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub kind: &'static str,
    pub name: String,
    pub source: ClusterError,
}

impl fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.source)
    }
}

/// All errors surfaced by the [`Deployer`](crate::Deployer).
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[error("timed out after {}s waiting for {what}{}", waited.as_secs(), last.as_deref().map(|m| format!(" (last status: {m})")).unwrap_or_default())]
    Timeout {
        what: String,
        waited: Duration,
        last: Option<String>,
    },

    #[error("operation cancelled")]
    Cancelled,

    /// Several independent deletions failed; none short-circuited the others.
    #[error("delete failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Partial(Vec<DeleteFailure>),
}

impl DeployError {
    pub fn is_not_found(&self) -> bool {
        match self {
            DeployError::NotFound { .. } => true,
            DeployError::Cluster(err) => err.is_not_found(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DeployError::Timeout { .. })
    }
}
