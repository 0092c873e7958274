use std::path::PathBuf;

use thiserror::Error;

/// Failure of an external command (`docker`, `kind`, `minikube`).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", status.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{program} cancelled")]
    Cancelled { program: String },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Dockerfile not found at {0}")]
    MissingDockerfile(PathBuf),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("no image loader for kube context {0:?} (supported: kind-*, minikube, docker-desktop)")]
    UnsupportedContext(String),
}

/// Error surface for the watch loop, its collaborators and the one-shot
/// pipeline.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] kudev_core::ConfigError),

    #[error("hash error: {0}")]
    Hash(#[from] kudev_hash::HashError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("image load failed: {0}")]
    Load(#[from] LoadError),

    #[error("deploy failed: {0}")]
    Deploy(#[from] kudev_deployer::DeployError),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl DaemonError {
    /// True when the error only reports that a cancellation was honoured.
    pub fn is_cancelled(&self) -> bool {
        match self {
            DaemonError::Build(BuildError::Command(CommandError::Cancelled { .. }))
            | DaemonError::Load(LoadError::Command(CommandError::Cancelled { .. }))
            | DaemonError::Deploy(kudev_deployer::DeployError::Cancelled) => true,
            _ => false,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
