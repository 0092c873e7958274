//! `kudev up [--wait] [--timeout <secs>]`

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kudev_daemon::shutdown_token;
use kudev_deployer::Deployer;

use super::{block_on, load_config, pipeline, source_digest};
use crate::output::{print_status, print_summary};

/// Build, load and deploy the current sources once.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Block until every replica is ready.
    #[arg(long)]
    pub wait: bool,

    /// Seconds to wait for readiness with `--wait`.
    #[arg(long, default_value_t = 120, value_name = "SECS")]
    pub timeout: u64,
}

impl UpArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let config = load_config(dir)?;
        block_on(async move {
            let cancel = shutdown_token();
            let digest = source_digest(&config)?;
            let pipeline = pipeline(&config).await?;

            let summary = pipeline
                .build_and_deploy(&config, &digest, &cancel)
                .await
                .context("deploy failed")?;
            print_summary(&summary);

            if self.wait {
                println!("{} waiting up to {}s for readiness", "…".bright_black(), self.timeout);
                let status = pipeline
                    .deployer()
                    .wait_for_ready(
                        &config.app_name,
                        &config.namespace,
                        Duration::from_secs(self.timeout),
                        &cancel,
                    )
                    .await
                    .context("deployment did not become ready")?;
                print_status(&status);
            }
            Ok(())
        })
    }
}
