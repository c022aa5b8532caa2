//! Tally CLI - message quota tracking
//!
//! A command-line interface for watching a per-user message quota:
//! one-shot status reads, live synchronization, and local history.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use tally_core::AppConfig;

#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about = "Message quota tracking CLI", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Override database path (or set TALLY_DB_PATH env var)
    #[arg(long, env = "TALLY_DB_PATH", global = true)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current quota for the signed-in account
    Status,

    /// Watch the quota live, recording changes to local history
    Watch {
        /// Stop after this many seconds (default: run until ctrl-c)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// List recorded usage snapshots
    History {
        /// Account id (defaults to the signed-in identity)
        #[arg(long)]
        user: Option<String>,

        /// Maximum number of snapshots to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    // Set up database path if provided
    if let Some(db_path) = &cli.db {
        std::env::set_var("TALLY_DB_PATH", db_path);
    }

    let config = AppConfig::load()?;

    let ctx = commands::Context {
        config,
        format: cli.format,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Status => commands::status::run(&ctx).await,
        Commands::Watch { duration_secs } => commands::watch::run(&ctx, duration_secs).await,
        Commands::History { user, limit } => commands::history::run(&ctx, user, limit).await,
        Commands::Config { action } => commands::config::run(&ctx, action).await,
    };

    if let Err(err) = result {
        output::print_error(&format!("Error: {:#}", err));
        std::process::exit(1);
    }

    Ok(())
}
