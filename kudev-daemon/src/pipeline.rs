//! One build → load → deploy pass, shared by `kudev up` and every
//! watch-loop cycle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use kudev_core::{Config, ObservedStatus, SourceDigest};
use kudev_deployer::Deployer;
use kudev_hash::{ImageTag, Tagger};

use crate::builder::{BuildRequest, Builder, BuiltImage};
use crate::error::DaemonError;
use crate::loader::ImageLoader;

/// Outcome of a successful [`Pipeline::build_and_deploy`].
#[derive(Debug, Clone, Serialize)]
pub struct DeploySummary {
    pub tag: String,
    pub image_ref: String,
    pub status: ObservedStatus,
    pub elapsed: Duration,
}

/// The external collaborators of a rebuild, behind their traits.
#[derive(Clone)]
pub struct Pipeline {
    builder: Arc<dyn Builder>,
    loader: Arc<dyn ImageLoader>,
    deployer: Arc<dyn Deployer>,
}

impl Pipeline {
    pub fn new(
        builder: Arc<dyn Builder>,
        loader: Arc<dyn ImageLoader>,
        deployer: Arc<dyn Deployer>,
    ) -> Self {
        Self {
            builder,
            loader,
            deployer,
        }
    }

    pub fn deployer(&self) -> &Arc<dyn Deployer> {
        &self.deployer
    }

    /// Tag, build and load the image for `digest`.
    pub async fn build(
        &self,
        config: &Config,
        digest: &SourceDigest,
        no_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<(ImageTag, BuiltImage), DaemonError> {
        let tag = Tagger::new(digest.clone()).generate_tag(false);
        let mut request = BuildRequest::from_config(config, tag.clone(), digest.clone());
        request.no_cache = no_cache;

        let image = self.builder.build(&request, cancel).await?;
        tracing::debug!(loader = self.loader.name(), image = %image.full_ref, "loading image");
        self.loader.load(&image.full_ref, cancel).await?;
        Ok((tag, image))
    }

    /// Tag, build, load, then upsert the workload for `digest`.
    pub async fn build_and_deploy(
        &self,
        config: &Config,
        digest: &SourceDigest,
        cancel: &CancellationToken,
    ) -> Result<DeploySummary, DaemonError> {
        let started = Instant::now();
        let (tag, image) = self.build(config, digest, false, cancel).await?;

        if cancel.is_cancelled() {
            return Err(kudev_deployer::DeployError::Cancelled.into());
        }
        let desired = config.desired_state(&image.full_ref, digest);
        let status = self.deployer.upsert(&desired).await?;

        let summary = DeploySummary {
            tag: tag.to_string(),
            image_ref: image.full_ref,
            status,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            image = %summary.image_ref,
            status = %summary.status.status_code,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "deployed",
        );
        Ok(summary)
    }
}
