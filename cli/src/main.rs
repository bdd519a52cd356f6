use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod commands;
mod utils;

use commands::{check, inspect};
use utils::loading::PolicyArgs;

/// Policy CLI - Inspect and query compiled authorization policies
#[derive(Parser)]
#[command(name = "polc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a role set may perform an access
    Check {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Entity type to check
        #[arg(short, long)]
        entity: String,

        /// Requested access, e.g. "read" or "update|api_put"
        #[arg(short, long)]
        access: String,

        /// JSON file holding the record's field values
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Field to check on the record
        #[arg(long, requires = "record")]
        field: Option<String>,

        /// User id placed in the operation context
        #[arg(short, long)]
        user: Option<String>,

        /// Dynamic grants to activate with the record as root
        #[arg(long, value_delimiter = ',', requires = "record")]
        activate: Vec<String>,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the compiled authority of a role set
    Inspect {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Check {
            policy,
            entity,
            access,
            record,
            field,
            user,
            activate,
            format,
        } => check::execute(check::CheckRequest {
            policy,
            entity,
            access,
            record,
            field,
            user,
            activate,
            format,
        }),
        Commands::Inspect { policy, format } => inspect::execute(policy, format).map(|_| true),
    };

    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}
