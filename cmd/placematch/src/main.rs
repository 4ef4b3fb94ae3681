//! placematch - geohash-sharded entity resolution between location datasets.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{CompareCommand, IngestCommand, MatchCommand, Status};
use config::Config;

/// placematch finds records in two location datasets that describe the same
/// place.
///
/// Datasets are loaded into stores with `ingest`. `compare` then sweeps every
/// geohash cell of the target store, matching its records against the
/// source records of the same cell. `match` compares records from files
/// one at a time against a source store, caching per-cell indices.
///
/// Exit status: 0 clean, 2 finished with skipped records or failed shards,
/// 1 failed to start, 130 interrupted.
#[derive(Parser)]
#[command(name = "placematch")]
#[command(about = "Geohash-sharded location matching")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.placematch/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load GeoJSON or CSV files into a store
    Ingest(IngestCommand),
    /// Match every cell of a target store against a source store
    Compare(CompareCommand),
    /// Match records from files against a source store
    Match(MatchCommand),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<Status> {
    let cfg = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Ingest(cmd) => cmd.run(),
        Commands::Compare(cmd) => cmd.run(&cfg).await,
        Commands::Match(cmd) => cmd.run(&cfg).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(status) => status.exit_code(),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
