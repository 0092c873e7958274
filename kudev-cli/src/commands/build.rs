//! `kudev build [--no-cache]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kudev_daemon::{shutdown_token, BuildRequest, Builder, DockerBuilder};
use kudev_hash::Tagger;

use super::{block_on, kube_context, load_config, loader, source_digest};

/// Build the image for the current sources and load it into the cluster.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Pass `--no-cache` to docker build.
    #[arg(long)]
    pub no_cache: bool,

    /// Build only; skip loading into the cluster.
    #[arg(long)]
    pub skip_load: bool,
}

impl BuildArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let config = load_config(dir)?;
        block_on(async move {
            let cancel = shutdown_token();
            let digest = source_digest(&config)?;
            let tag = Tagger::new(digest.clone()).generate_tag(false);
            let mut request = BuildRequest::from_config(&config, tag, digest);
            request.no_cache = self.no_cache;

            let image = DockerBuilder::new()
                .build(&request, &cancel)
                .await
                .context("image build failed")?;
            println!("{} built {} ({})", "✓".green().bold(), image.full_ref.bold(), image.id);

            if !self.skip_load {
                let context = kube_context(&config)?;
                loader(&context)?
                    .load(&image.full_ref, &cancel)
                    .await
                    .with_context(|| format!("failed to load image into {context}"))?;
                println!("{} loaded into {}", "✓".green().bold(), context);
            }
            Ok(())
        })
    }
}
