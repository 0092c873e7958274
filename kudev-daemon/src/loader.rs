//! Making a locally built image visible to the cluster.
//!
//! | Context               | Loader                 | Command                                  |
//! |-----------------------|------------------------|------------------------------------------|
//! | `kind-<cluster>`      | [`KindLoader`]         | `kind load docker-image <ref> --name <cluster>` |
//! | `minikube`            | [`MinikubeLoader`]     | `minikube image load <ref> -p minikube`  |
//! | `docker-desktop`      | [`DockerDesktopLoader`] | none; the cluster shares the host store |

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LoadError;
use crate::process;

#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn load(&self, image_ref: &str, cancel: &CancellationToken) -> Result<(), LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindLoader {
    pub cluster: String,
}

#[async_trait]
impl ImageLoader for KindLoader {
    fn name(&self) -> &'static str {
        "kind"
    }

    async fn load(&self, image_ref: &str, cancel: &CancellationToken) -> Result<(), LoadError> {
        let args = [
            "load",
            "docker-image",
            image_ref,
            "--name",
            self.cluster.as_str(),
        ]
        .map(String::from);
        process::run("kind", &args, cancel).await?;
        tracing::info!(image = %image_ref, cluster = %self.cluster, "loaded image into kind");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinikubeLoader {
    pub profile: String,
}

#[async_trait]
impl ImageLoader for MinikubeLoader {
    fn name(&self) -> &'static str {
        "minikube"
    }

    async fn load(&self, image_ref: &str, cancel: &CancellationToken) -> Result<(), LoadError> {
        let args = ["image", "load", image_ref, "-p", self.profile.as_str()].map(String::from);
        process::run("minikube", &args, cancel).await?;
        tracing::info!(image = %image_ref, profile = %self.profile, "loaded image into minikube");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DockerDesktopLoader;

#[async_trait]
impl ImageLoader for DockerDesktopLoader {
    fn name(&self) -> &'static str {
        "docker-desktop"
    }

    async fn load(&self, image_ref: &str, _cancel: &CancellationToken) -> Result<(), LoadError> {
        tracing::debug!(image = %image_ref, "docker-desktop shares the host image store");
        Ok(())
    }
}

/// Pick the loader for a kube context name.
pub fn loader_for_context(context: &str) -> Result<Box<dyn ImageLoader>, LoadError> {
    if let Some(cluster) = context.strip_prefix("kind-").filter(|c| !c.is_empty()) {
        return Ok(Box::new(KindLoader {
            cluster: cluster.to_string(),
        }));
    }
    match context {
        "minikube" => Ok(Box::new(MinikubeLoader {
            profile: context.to_string(),
        })),
        "docker-desktop" | "docker-for-desktop" => Ok(Box::new(DockerDesktopLoader)),
        other => Err(LoadError::UnsupportedContext(other.to_string())),
    }
}
