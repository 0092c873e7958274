//! `kudev hash [--json]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use kudev_hash::Tagger;

use super::{load_config, source_digest};

/// Print the source digest and the tag it maps to.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct HashReport {
    digest: String,
    tag: String,
    image: String,
}

impl HashArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let config = load_config(dir)?;
        let digest = source_digest(&config)?;
        let tag = Tagger::new(digest.clone()).generate_tag(false);
        let report = HashReport {
            image: format!("{}:{}", config.image_name(), tag),
            digest: digest.0,
            tag: tag.0,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize hash JSON")?
            );
        } else {
            println!("digest: {}", report.digest);
            println!("tag:    {}", report.tag);
            println!("image:  {}", report.image);
        }
        Ok(())
    }
}
