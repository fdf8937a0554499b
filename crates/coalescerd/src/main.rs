//! Coalescer Daemon - wake timer consolidation service
//!
//! Keeps a single resume timer set just ahead of the next pending wake timer
//! that is far enough away to matter, so clustered timers wake the machine
//! once.

use anyhow::Result;
use clap::{Parser, Subcommand};
use coalescerd::host;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coalescerd")]
#[command(about = "Coalesce pending wake timers into a single resume", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (default: coalescerd.toml next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run under the service control manager
    Service,

    /// Run in the foreground until Ctrl-C
    Run,

    /// Show pending wake timers and the one that would be covered
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Service => host::service(cli.config),
        Commands::Run => host::console(cli.config),
        Commands::List { json } => host::list(cli.config, json),
    }
}
