//! colldb CLI
//!
//! Administrative tool for colldb snapshot files.
//!
//! # Commands
//!
//! - `inspect` - Show per-collection record, tombstone and watermark state
//! - `sync-data` - Run the sync handshake and print the watermark table
//! - `upgrade` - Promote stale records to the current version
//! - `cleanup` - Run tombstone retention cleanup
//! - `hard-delete` - Flag a record for hard delete and run the cascade

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod session;

/// colldb command-line tools.
#[derive(Parser)]
#[command(name = "colldb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot file
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Collection manifest (JSON)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show collection state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the per-collection sync watermarks, bootstrapping new ones
    SyncData {
        /// Do not write bootstrapped watermarks back
        #[arg(long)]
        dry_run: bool,
    },

    /// Promote stale records to the current version
    Upgrade {
        /// Only this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Rewrite every record, not only stale ones
        #[arg(long)]
        force: bool,
    },

    /// Purge the oldest tombstones beyond the retain count
    Cleanup {
        /// Tombstones to keep (overrides the manifest)
        #[arg(short, long)]
        retain: Option<usize>,
    },

    /// Hard-delete a record and its archive history
    HardDelete {
        /// Collection name
        #[arg(short, long)]
        collection: String,

        /// Record id
        #[arg(short, long)]
        id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let options = session::SessionOptions {
        manifest: cli.manifest,
        retain: None,
    };

    match cli.command {
        Commands::Inspect { format } => {
            let path = require_path(cli.path)?;
            commands::inspect::run(&path, options, &format)?;
        }
        Commands::SyncData { dry_run } => {
            let path = require_path(cli.path)?;
            commands::sync_data::run(&path, options, dry_run)?;
        }
        Commands::Upgrade { collection, force } => {
            let path = require_path(cli.path)?;
            commands::upgrade::run(&path, options, collection.as_deref(), force)?;
        }
        Commands::Cleanup { retain } => {
            let path = require_path(cli.path)?;
            commands::cleanup::run(&path, session::SessionOptions { retain, ..options })?;
        }
        Commands::HardDelete { collection, id } => {
            let path = require_path(cli.path)?;
            commands::hard_delete::run(&path, options, &collection, &id)?;
        }
        Commands::Version => {
            println!("colldb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("colldb Core v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn require_path(path: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    path.ok_or_else(|| "Snapshot path required (--path)".into())
}
