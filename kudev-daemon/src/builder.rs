//! Container image builds.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use kudev_core::{Config, SourceDigest};
use kudev_hash::ImageTag;

use crate::error::BuildError;
use crate::process;

/// Everything needed for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub source_dir: PathBuf,
    pub dockerfile: PathBuf,
    pub image_name: String,
    pub tag: ImageTag,
    pub digest: SourceDigest,
    pub build_args: BTreeMap<String, String>,
    pub target: Option<String>,
    pub no_cache: bool,
}

impl BuildRequest {
    pub fn from_config(config: &Config, tag: ImageTag, digest: SourceDigest) -> Self {
        Self {
            source_dir: config.project_root.clone(),
            dockerfile: config.dockerfile(),
            image_name: config.image_name().to_string(),
            tag,
            digest,
            build_args: config.build_args.clone(),
            target: config.target.clone(),
            no_cache: false,
        }
    }

    /// `name:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.tag)
    }
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    pub full_ref: String,
    pub id: String,
    pub digest: SourceDigest,
}

#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuiltImage, BuildError>;
}

/// Builds with the local `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerBuilder {
    program: String,
}

impl Default for DockerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerBuilder {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Use a different docker-compatible CLI (e.g. `podman`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn build_args(request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            request.dockerfile.display().to_string(),
            "-t".to_string(),
            request.image_ref(),
        ];
        for (key, value) in &request.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        if let Some(target) = &request.target {
            args.push("--target".to_string());
            args.push(target.clone());
        }
        if request.no_cache {
            args.push("--no-cache".to_string());
        }
        args.push(request.source_dir.display().to_string());
        args
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<BuiltImage, BuildError> {
        if !request.dockerfile.is_file() {
            return Err(BuildError::MissingDockerfile(request.dockerfile.clone()));
        }
        let full_ref = request.image_ref();
        tracing::info!(image = %full_ref, "building image");

        process::run(&self.program, &Self::build_args(request), cancel).await?;

        let inspect = vec![
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            full_ref.clone(),
        ];
        let id = process::run(&self.program, &inspect, cancel).await?;
        tracing::info!(image = %full_ref, %id, "image built");

        Ok(BuiltImage {
            full_ref,
            id,
            digest: request.digest.clone(),
        })
    }
}
