//! `kudev init [--name <app>]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use kudev_core::config;

/// Write a starter `.kudev.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Application name (default: derived from the directory name).
    #[arg(long, short = 'n')]
    pub name: Option<String>,
}

impl InitArgs {
    pub fn run(self, dir: &Path) -> Result<()> {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", dir.display()))?;
        let name = match self.name {
            Some(name) => name,
            None => app_name_from_dir(&dir)
                .context("cannot derive an app name from the directory; pass --name")?,
        };

        let path = config::init_at(&dir, &name)
            .with_context(|| format!("failed to init '{}'", dir.display()))?;
        println!("{} wrote {} for '{}'", "✓".green().bold(), path.display(), name);
        println!("  next: add a Dockerfile, then run `kudev up` or `kudev dev`");
        Ok(())
    }
}

/// Directory name folded into a DNS-1123 label.
fn app_name_from_dir(dir: &Path) -> Option<String> {
    let raw = dir.file_name()?.to_string_lossy().to_lowercase();
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name.truncate(63);
    let name = name.trim_matches('-').to_string();
    (!name.is_empty()).then_some(name)
}
