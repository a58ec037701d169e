//! Binary entry point for curator.
//!
//! This binary provides the CLI interface for analyzing and restructuring
//! capability unit inventories.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curator::cli::{AnalyzeCommand, ApplyCommand, ApproveCommand, ConfigCommand, EvaluateCommand};
use curator::config::CuratorConfig;
use curator::observability::{self, InitOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Exit code when some approved ops did not validate.
const EXIT_PARTIAL: u8 = 2;

/// Curator - overlap analysis and safe restructuring for capability units.
#[derive(Parser)]
#[command(name = "curator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CURATOR_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Score an inventory and report overlap clusters.
    Analyze {
        /// Inventory directory (defaults to the configured inventory).
        inventory: Option<PathBuf>,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,

        /// Similarity threshold for clustering (0.0-1.0).
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Run the three-role review and write a decision table.
    Evaluate {
        /// Inventory directory (defaults to the configured inventory).
        inventory: Option<PathBuf>,

        /// Decision table output path.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Approve rows of a decision table.
    Approve {
        /// Decision table file.
        table: PathBuf,

        /// Row identifiers to approve.
        #[arg(required = true)]
        rows: Vec<String>,

        /// Approver name (defaults to $USER).
        #[arg(long)]
        by: Option<String>,
    },

    /// Apply approved rows, then re-verify the inventory.
    Apply {
        /// Inventory directory.
        inventory: PathBuf,

        /// Decision table file.
        table: PathBuf,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let _observability =
        match observability::init_from_config(&config, InitOptions { verbose: cli.verbose }) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Failed to initialize observability: {e}");
                return ExitCode::FAILURE;
            },
        };

    match run_command(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: &CuratorConfig) -> Result<ExitCode> {
    let mut stdout = std::io::stdout().lock();

    match command {
        Commands::Analyze {
            inventory,
            json,
            threshold,
        } => {
            let command = AnalyzeCommand {
                inventory: resolve_inventory(inventory, config)?,
                json,
                threshold,
            };
            command.run(config, &mut stdout)?;
        },

        Commands::Evaluate {
            inventory,
            out,
            json,
        } => {
            let cancel = CancellationToken::new();
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                tracing::warn!("Interrupt received, aborting evaluation");
                handler_token.cancel();
            })
            .context("failed to install interrupt handler")?;

            let command = EvaluateCommand {
                inventory: resolve_inventory(inventory, config)?,
                out,
                json,
            };
            command.run(config, cancel, &mut stdout).await?;
        },

        Commands::Approve { table, rows, by } => {
            ApproveCommand { table, rows, by }.run(&mut stdout)?;
        },

        Commands::Apply {
            inventory,
            table,
            json,
        } => {
            let outcome = ApplyCommand {
                inventory,
                table,
                json,
            }
            .run(config, &mut stdout)?;
            if !outcome.all_succeeded() {
                stdout.flush()?;
                return Ok(ExitCode::from(EXIT_PARTIAL));
            }
        },

        Commands::Config { show } => ConfigCommand { show }.run(config, &mut stdout)?,
    }

    stdout.flush()?;
    Ok(ExitCode::SUCCESS)
}

/// Loads configuration from an explicit path or the default locations.
fn load_config(path: Option<&Path>) -> Result<CuratorConfig> {
    match path {
        Some(path) => CuratorConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(CuratorConfig::load_default()),
    }
}

/// Uses the positional inventory path, falling back to the configured one.
fn resolve_inventory(arg: Option<PathBuf>, config: &CuratorConfig) -> Result<PathBuf> {
    arg.or_else(|| config.inventory.clone())
        .context("no inventory given and none configured")
}
