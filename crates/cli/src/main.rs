// posthours CLI - keep map opening hours in step with the post office dataset

mod exit_codes;
mod merge;
mod stale;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "posthours")]
#[command(about = "Three-way sync of post office opening hours into OpenStreetMap")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (debug). RUST_LOG overrides.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Less log output (warnings and errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile external hours with a map snapshot and write a change file
    #[command(after_help = "\
Examples:
  posthours sync sync.toml
  posthours sync sync.toml --dry-run --json
  posthours sync sync.toml --now 2021-06-01 --strict")]
    Sync {
        /// Path to the sync TOML config
        config: PathBuf,

        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long, value_parser = parse_date, env = "POSTHOURS_NOW")]
        now: Option<NaiveDate>,

        /// Decide and report, but write no files
        #[arg(long)]
        dry_run: bool,

        /// Output the full result as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Exit non-zero on duplicate references or unresolved conflicts
        #[arg(long)]
        strict: bool,
    },

    /// Validate a sync config without running
    #[command(after_help = "\
Examples:
  posthours validate sync.toml")]
    Validate {
        /// Path to the sync TOML config
        config: PathBuf,
    },

    /// Merge pipe-delimited hours files; later files win per reference
    #[command(after_help = "\
Examples:
  posthours merge batch1.txt batch2.txt --output hours.txt")]
    Merge {
        /// Input hours files, in increasing priority
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Merged output file (sorted by reference)
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Check whether NEW differs from OLD only by dropping past special days
    #[command(after_help = "\
Examples:
  posthours check-stale --old 'Mo-Fr 09:00-17:00; PH off; 2020 Dec 24 off' \\
                        --new 'Mo-Fr 09:00-17:00; PH off'
  posthours check-stale --old ... --new ... --now 2020-12-01 --json")]
    CheckStale {
        /// Hours expression currently on the map
        #[arg(long)]
        old: String,

        /// Hours expression from the external dataset
        #[arg(long)]
        new: String,

        /// Treat this date (YYYY-MM-DD) as today
        #[arg(long, value_parser = parse_date)]
        now: Option<NaiveDate>,

        /// Error sentinel; expressions containing it are never stale
        #[arg(long, default_value = "ERROR")]
        error_marker: String,

        /// Output the verdict as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("POSTHOURS_REVISION"), ")",
        "\nengine:  posthours-recon ", env!("CARGO_PKG_VERSION"),
        "\nbuild:   ", env!("POSTHOURS_PROFILE"),
        "\ntarget:  ", env!("POSTHOURS_TARGET"),
    )
}

/// Logs go to stderr so `--json` stdout stays a single JSON value.
fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Sync { config, now, dry_run, json, strict } => {
            sync::cmd_sync(config, now, dry_run, json, strict, cli.quiet)
        }
        Commands::Validate { config } => sync::cmd_validate(config),
        Commands::Merge { inputs, output } => merge::cmd_merge(inputs, output),
        Commands::CheckStale { old, new, now, error_marker, json } => {
            stale::cmd_check_stale(old, new, now, error_marker, json)
        }
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

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Exit with `code` but print nothing.
    pub fn silent(code: u8) -> Self {
        Self::new(code, "")
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
