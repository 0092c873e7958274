//! kudev: local Kubernetes hot-reload.
//!
//! # Usage
//!
//! ```text
//! kudev init [--name <app>]
//! kudev hash [--json]
//! kudev build [--no-cache]
//! kudev up [--wait] [--timeout <secs>]
//! kudev dev [--debounce-ms <ms>]
//! kudev status [--json]
//! kudev down [--all | --wait]
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    build::BuildArgs, dev::DevArgs, down::DownArgs, hash::HashArgs, init::InitArgs,
    status::StatusArgs, up::UpArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "kudev",
    version,
    about = "Rebuild and redeploy to a local Kubernetes cluster on every change",
    long_about = None,
)]
struct Cli {
    /// Project directory (default: current directory; `.kudev.yaml` is
    /// searched upward from here).
    #[arg(long, short = 'C', global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter `.kudev.yaml`.
    Init(InitArgs),

    /// Print the source digest and image tag.
    Hash(HashArgs),

    /// Build the image and load it into the cluster.
    Build(BuildArgs),

    /// Build, load and deploy once.
    Up(UpArgs),

    /// Watch sources and redeploy on every change until Ctrl-C.
    Dev(DevArgs),

    /// Show deployment health.
    Status(StatusArgs),

    /// Delete the deployed resources.
    Down(DownArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    kudev_daemon::init_tracing(cli.verbose, cli.log_json);

    let dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    match cli.command {
        Commands::Init(args) => args.run(&dir),
        Commands::Hash(args) => args.run(&dir),
        Commands::Build(args) => args.run(&dir),
        Commands::Up(args) => args.run(&dir),
        Commands::Dev(args) => args.run(&dir),
        Commands::Status(args) => args.run(&dir),
        Commands::Down(args) => args.run(&dir),
    }
}
