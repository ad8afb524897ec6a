//! Converge: keep local deployments converged on their git repositories.
//!
//! # Usage
//!
//! ```text
//! converge run [--config <path>] [--listen <addr>] [--interval <secs>] [--log-level <level>] [--log-json]
//! converge sync [<project>] [--addr <addr>]
//! converge status [--json] [--addr <addr>]
//! converge projects [--config <path>] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{projects::ProjectsArgs, run::RunArgs, status::StatusArgs, sync::SyncArgs};

#[derive(Parser, Debug)]
#[command(
    name = "converge",
    version,
    about = "Reconcile local working copies with their git remotes",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the reconciliation daemon in the foreground.
    Run(RunArgs),

    /// Ask a running daemon to re-check now.
    Sync(SyncArgs),

    /// Show per-project state from a running daemon.
    Status(StatusArgs),

    /// List the projects in the config file.
    Projects(ProjectsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Projects(args) => args.run(),
    }
}
