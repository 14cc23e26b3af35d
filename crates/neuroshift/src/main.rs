//! NeuroShift command-line launcher
//!
//! Inspects and manages the analytics saved by NeuroShift runs: list them,
//! show per-class metrics, export predictions, pick the reference run.

use anyhow::Result;
use clap::{Parser, Subcommand};
use neuroshift_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "neuroshift", about = "Robustness analytics for neural networks")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "NEUROSHIFT_CONFIG",
        default_value = neuroshift_core::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List saved analytics with their overall metrics
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show per-class metrics of one analytic
    Show {
        /// Job id of the analytic
        job_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the predictions of an analytic as CSV
    Export {
        /// Job id of the analytic
        job_id: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Set or clear the reference analytic
    Reference {
        /// Job id of the new reference
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        job_id: Option<String>,

        /// Clear the current reference
        #[arg(long)]
        clear: bool,
    },

    /// Delete a saved analytic and its file
    Delete {
        /// Job id of the analytic
        job_id: String,
    },
}

fn run_command(cli: Cli) -> Result<()> {
    let config = cli::config::load(&cli.config)?;
    match cli.command {
        Commands::Config { json } => cli::config::run(&cli.config, &config, json),
        Commands::History { json } => cli::analytics::run_history(&config, json),
        Commands::Show { job_id, json } => cli::analytics::run_show(&config, &job_id, json),
        Commands::Export { job_id, output } => {
            cli::analytics::run_export(&config, &job_id, output.as_deref())
        }
        Commands::Reference { job_id, clear } => {
            cli::analytics::run_reference(&config, job_id.as_deref(), clear)
        }
        Commands::Delete { job_id } => cli::analytics::run_delete(&config, &job_id),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "neuroshift",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
