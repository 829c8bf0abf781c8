//! Warden: keep one detached worker running per registered script.
//!
//! # Usage
//!
//! ```text
//! warden [list] [--json]
//! warden add <file>
//! warden remove <file>
//! warden start [--detach]
//! warden status [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    list::ListArgs,
    script::{AddArgs, RemoveArgs},
    start::StartArgs,
    status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Supervise long-running scripts registered in ~/.nodemon",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print all registered scripts (default).
    #[command(visible_alias = "l")]
    List(ListArgs),

    /// Register a script; a running daemon starts it.
    #[command(visible_alias = "a")]
    Add(AddArgs),

    /// Stop the worker for a script. The registration is kept.
    Remove(RemoveArgs),

    /// Run the supervisor daemon.
    Start(StartArgs),

    /// Show the daemon lease and live workers.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = commands::prepare_home()?;

    match cli.command.unwrap_or(Commands::List(ListArgs::default())) {
        Commands::List(args) => args.run(&home),
        Commands::Add(args) => args.run(&home),
        Commands::Remove(args) => args.run(&home),
        Commands::Start(args) => args.run(&home),
        Commands::Status(args) => args.run(&home),
    }
}
