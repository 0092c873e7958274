//! Subcommands and the wiring they share.

pub mod build;
pub mod dev;
pub mod down;
pub mod hash;
pub mod init;
pub mod status;
pub mod up;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use kudev_core::{config, Config, ConfigError, SourceDigest};
use kudev_daemon::{loader_for_context, DockerBuilder, ImageLoader, Pipeline};
use kudev_deployer::{current_context, ClusterDeployer, KubeCluster};
use kudev_hash::{Exclusions, HashCalculator};
use kudev_renderer::Renderer;

/// Find and validate `.kudev.yaml` from `dir` upward.
pub fn load_config(dir: &Path) -> Result<Config> {
    match config::discover(dir) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound { .. }) => anyhow::bail!(
            "no .kudev.yaml found in {} or any parent; run `kudev init` first",
            dir.display()
        ),
        Err(err) => Err(err).context("failed to load .kudev.yaml"),
    }
}

pub fn source_digest(config: &Config) -> Result<SourceDigest> {
    let exclusions = Exclusions::new(&config.build_context_exclusions)
        .context("invalid build_context_exclusions")?;
    HashCalculator::new(config.project_root.clone(), exclusions)
        .calculate()
        .with_context(|| format!("failed to hash {}", config.project_root.display()))
}

/// The configured kube context, or the kubeconfig's current one.
pub fn kube_context(config: &Config) -> Result<String> {
    match &config.kube_context {
        Some(context) => Ok(context.clone()),
        None => current_context().context("could not determine the current kube context"),
    }
}

pub fn loader(context: &str) -> Result<Arc<dyn ImageLoader>> {
    Ok(Arc::from(loader_for_context(context)?))
}

pub async fn deployer(config: &Config, context: &str) -> Result<ClusterDeployer<KubeCluster>> {
    let cluster = KubeCluster::connect(Some(context))
        .await
        .with_context(|| format!("failed to connect to kube context {context}"))?;
    let templates = config.templates_dir();
    let renderer = Renderer::with_template_dir(templates.as_deref())
        .context("failed to load manifest templates")?;
    Ok(ClusterDeployer::new(cluster, renderer))
}

pub async fn pipeline(config: &Config) -> Result<Pipeline> {
    let context = kube_context(config)?;
    let loader = loader(&context)?;
    let deployer = deployer(config, &context).await?;
    Ok(Pipeline::new(
        Arc::new(DockerBuilder::new()),
        loader,
        Arc::new(deployer),
    ))
}

/// Run an async command body on a fresh multi-threaded runtime.
pub fn block_on<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(future)
}
