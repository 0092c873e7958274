//! `kudev status [--json]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kudev_deployer::{DeployError, Deployer};

use super::{block_on, deployer, kube_context, load_config};
use crate::output::print_status;

/// Show the health of the deployed workload.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let config = load_config(dir)?;
        block_on(async move {
            let context = kube_context(&config)?;
            let deployer = deployer(&config, &context).await?;

            let status = match deployer.status(&config.app_name, &config.namespace).await {
                Ok(status) => status,
                Err(DeployError::NotFound { kind, name, namespace }) => {
                    if self.json {
                        println!("null");
                    } else {
                        println!(
                            "{} {kind} {namespace}/{name} is not deployed; run `kudev up`",
                            "○".bright_black()
                        );
                    }
                    return Ok(());
                }
                Err(err) => return Err(err).context("failed to read deployment status"),
            };

            if self.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status).context("failed to serialize status")?
                );
            } else {
                println!("{} context {}", "●".cyan(), context);
                print_status(&status);
            }
            Ok(())
        })
    }
}
