//! `EmberDB` Command Line Interface
//!
//! A CLI tool for backing up, restoring and inspecting `EmberDB` databases.

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{backup, documents, restore, verify};
use crate::error::Result;

/// `EmberDB` Command Line Interface
///
/// An embedded document store with full and incremental backup chains.
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the data directory
    #[arg(short, long, env = "EMBER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    Table,
    /// JSON format
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up the database into a backup location
    Backup {
        /// Backup location
        #[arg(short, long)]
        target: PathBuf,

        /// Append an incremental capture instead of starting a new chain
        #[arg(short, long)]
        incremental: bool,

        /// Switch the database to linear journal retention (otherwise the recorded mode is kept)
        #[arg(long)]
        linear: bool,

        /// Allow incremental backups for this database
        #[arg(long)]
        allow_incremental: bool,

        /// JSON stored verbatim in the capture's manifest
        #[arg(short, long)]
        metadata: Option<String>,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Restore a backup chain into an empty directory
    Restore {
        /// Backup location
        #[arg(short, long)]
        backup: PathBuf,

        /// Data directory to create
        #[arg(short, long)]
        target: PathBuf,

        /// Compact the restored data file
        #[arg(long)]
        defrag: bool,
    },

    /// Check a backup chain and every file it references
    Verify {
        /// Backup location
        #[arg(short, long)]
        backup: PathBuf,
    },

    /// Store a JSON document
    Put {
        /// Document key
        key: String,

        /// Document body
        json: String,
    },

    /// Print a document
    Get {
        /// Document key
        key: String,
    },

    /// Remove a document
    Delete {
        /// Document key
        key: String,
    },

    /// List all documents
    List,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();

    match cli.command {
        Commands::Backup { target, incremental, linear, allow_incremental, metadata, timeout_secs } => {
            let options = backup::Options {
                target,
                incremental,
                linear,
                allow_incremental,
                metadata,
                timeout_secs,
            };
            backup::run(data_dir, options, cli.format)
        }
        Commands::Restore { backup, target, defrag } => {
            restore::run(&backup, &target, defrag, cli.format)
        }
        Commands::Verify { backup } => verify::run(&backup, cli.format),
        Commands::Put { key, json } => documents::put(data_dir, &key, &json),
        Commands::Get { key } => documents::get(data_dir, &key, cli.format),
        Commands::Delete { key } => documents::delete(data_dir, &key),
        Commands::List => documents::list(data_dir, cli.format),
    }
}
