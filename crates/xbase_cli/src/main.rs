//! xbase CLI
//!
//! Maintenance tools for dBASE tables and their indices.
//!
//! # Commands
//!
//! - `info` - Display table metadata, fields and tags
//! - `check` - Check every open tag against the table
//! - `pack` - Remove deleted records and rebuild indices
//! - `delete-all` / `undelete-all` - Flag or unflag every record
//! - `dump` - Print records as text or JSON

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xbase_core::DeleteAllOption;

/// xBase table maintenance tools.
#[derive(Parser)]
#[command(name = "xbase")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the .DBF table
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display table metadata, fields and tags
    Info {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every open tag against the table
    Check {
        /// List each inconsistency
        #[arg(short, long)]
        detail: bool,
    },

    /// Remove deleted records, compact the memo file and rebuild indices
    Pack,

    /// Set the delete flag on every record
    DeleteAll,

    /// Clear the delete flag on every record
    UndeleteAll,

    /// Print records
    Dump {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Visit records in the order of this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Skip records flagged as deleted
        #[arg(short, long)]
        active: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { format } => {
            let path = cli.path.ok_or("Table path required for info")?;
            commands::info::run(&path, &format)?;
        }
        Commands::Check { detail } => {
            let path = cli.path.ok_or("Table path required for check")?;
            commands::check::run(&path, detail)?;
        }
        Commands::Pack => {
            let path = cli.path.ok_or("Table path required for pack")?;
            commands::pack::run(&path)?;
        }
        Commands::DeleteAll => {
            let path = cli.path.ok_or("Table path required for delete-all")?;
            commands::delete_all::run(&path, DeleteAllOption::Delete)?;
        }
        Commands::UndeleteAll => {
            let path = cli.path.ok_or("Table path required for undelete-all")?;
            commands::delete_all::run(&path, DeleteAllOption::Undelete)?;
        }
        Commands::Dump {
            limit,
            tag,
            active,
            format,
        } => {
            let path = cli.path.ok_or("Table path required for dump")?;
            let options = commands::dump::DumpOptions {
                limit,
                tag,
                active_only: active,
            };
            commands::dump::run(&path, &options, &format)?;
        }
        Commands::Version => {
            println!("xbase CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("xbase core v{}", xbase_core::VERSION);
        }
    }

    Ok(())
}
