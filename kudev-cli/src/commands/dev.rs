//! `kudev dev [--debounce-ms <ms>]`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kudev_daemon::{shutdown_token, Orchestrator};

use super::{block_on, load_config, pipeline, source_digest};
use crate::output::{print_summary, ConsoleReporter};

/// Deploy once, then rebuild and redeploy on every source change.
#[derive(Args, Debug)]
pub struct DevArgs {
    /// Quiet period before a burst of changes triggers a rebuild.
    #[arg(long, default_value_t = 500, value_name = "MS")]
    pub debounce_ms: u64,

    /// Skip the initial deploy and only react to changes.
    #[arg(long)]
    pub no_initial: bool,
}

impl DevArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let config = load_config(dir)?;
        block_on(async move {
            let cancel = shutdown_token();
            let pipeline = pipeline(&config).await?;

            if !self.no_initial {
                let digest = source_digest(&config)?;
                match pipeline.build_and_deploy(&config, &digest, &cancel).await {
                    Ok(summary) => print_summary(&summary),
                    Err(err) if err.is_cancelled() => return Ok(()),
                    // Keep watching; the next save may fix it.
                    Err(err) => eprintln!("{} initial deploy failed: {err}", "✗".red().bold()),
                }
            }

            Orchestrator::new(config, pipeline, Arc::new(ConsoleReporter))
                .context("failed to set up the watch loop")?
                .with_debounce_window(Duration::from_millis(self.debounce_ms))
                .run(cancel)
                .await
                .context("watch loop failed")?;
            println!("{} stopped", "■".bold());
            Ok(())
        })
    }
}
