//! `kudev down [--all | --wait]`

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kudev_daemon::shutdown_token;
use kudev_deployer::Deployer;

use super::{block_on, deployer, kube_context, load_config};

/// Delete the workload's Deployment and Service.
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Delete every kudev-managed workload in the namespace.
    #[arg(long)]
    pub all: bool,

    /// Block until the resources are gone. Not available with `--all`.
    #[arg(long, conflicts_with = "all")]
    pub wait: bool,

    /// Seconds to wait with `--wait`.
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    pub timeout: u64,
}

impl DownArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let config = load_config(dir)?;
        block_on(async move {
            let cancel = shutdown_token();
            let context = kube_context(&config)?;
            let deployer = deployer(&config, &context).await?;
            let namespace = config.namespace.as_str();

            if self.all {
                let removed = deployer
                    .delete_managed(namespace)
                    .await
                    .context("failed to delete managed resources")?;
                println!(
                    "{} deleted {removed} kudev-managed resource(s) in {namespace}",
                    "✓".green().bold()
                );
            } else {
                deployer
                    .delete(&config.app_name, namespace)
                    .await
                    .context("failed to delete resources")?;
                println!("{} deleted {}/{}", "✓".green().bold(), namespace, config.app_name);
            }

            if self.wait {
                deployer
                    .wait_for_deletion(
                        &config.app_name,
                        namespace,
                        Duration::from_secs(self.timeout),
                        &cancel,
                    )
                    .await
                    .context("resources were not removed in time")?;
                println!("{} resources gone", "✓".green().bold());
            }
            Ok(())
        })
    }
}
