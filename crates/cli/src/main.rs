// votegrid CLI - reconcile archived election-result snapshots into one table

mod commands;
mod exit_codes;
mod fetch;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "votegrid")]
#[command(about = "Reconcile archived vote-count snapshots into a time-consistent table")]
#[command(long_version = long_version())]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Only log warnings and errors (RUST_LOG overrides)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every listed snapshot, converge, and write the CSV table
    #[command(after_help = "\
Examples:
  votegrid run ga-precincts.toml
  votegrid run ga-precincts.toml --sources wayback-urls.txt --out GA.csv
  votegrid run ga-precincts.toml --out GA.csv --json > summary.json
  RUST_LOG=debug votegrid run pa-timeseries.toml > PA.csv")]
    Run {
        /// Path to the dataset .toml config
        config: PathBuf,

        /// Source list file (overrides [sources] list)
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Write CSV here (overrides [output] csv; stdout when neither is set)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,

        /// HTTP timeout per fetch, in seconds
        #[arg(long, env = "VOTEGRID_TIMEOUT", default_value_t = fetch::DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
    },

    /// Validate a dataset config without fetching anything
    #[command(after_help = "\
Examples:
  votegrid validate ga-precincts.toml")]
    Validate {
        /// Path to the dataset .toml config
        config: PathBuf,
    },

    /// List the identifiers a run would fetch, after filters and dedupe
    #[command(after_help = "\
Examples:
  votegrid sources ga-precincts.toml
  votegrid sources ga-precincts.toml --sources wayback-urls.txt --json")]
    Sources {
        /// Path to the dataset .toml config
        config: PathBuf,

        /// Source list file (overrides [sources] list)
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Output JSON instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  votegrid-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  votegrid-recon ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// Logs go to stderr so CSV and JSON on stdout stay clean.
fn init_logging(quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if quiet { "warn" } else { "info" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        None => {
            eprintln!("Usage: votegrid <command> [options]");
            eprintln!("       votegrid --help for more information");
            Err(CliError { code: EXIT_USAGE, message: String::new(), hint: None })
        }
        Some(Commands::Run { config, sources, out, json, timeout }) => {
            commands::cmd_run(config, sources, out, json, timeout)
        }
        Some(Commands::Validate { config }) => commands::cmd_validate(config),
        Some(Commands::Sources { config, sources, json }) => commands::cmd_sources(config, sources, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
