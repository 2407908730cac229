use anyhow::Result;
use clap::{Parser, Subcommand};
use fxgym::{
    commands::{
        backtest::{self, BacktestOptions},
        inspect, snapshot,
    },
    config::Instrument,
    data_loader::DataSplit,
    policy::PolicyKind,
};
use log::info;
use std::path::PathBuf;

const DEFAULT_OUTPUT_DIR: &str = "reports";

#[derive(Parser)]
#[command(name = "fxgym")]
#[command(about = "Deterministic market simulation for evaluating RL trading policies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a policy through the environment and write trade, equity and summary reports
    Backtest {
        /// Price CSV, or a `.bin` price series snapshot
        #[arg(long, value_name = "PATH")]
        data: PathBuf,
        /// Instrument preset (ignored when --config names a different instrument)
        #[arg(long, value_enum)]
        instrument: Option<Instrument>,
        /// JSON environment config; replaces the instrument preset
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Config override as KEY=VALUE, e.g. --set WINDOW_SIZE=48 (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
        /// Which side of the cut-over to evaluate on
        #[arg(long, value_enum, default_value_t = DataSplit::Test)]
        split: DataSplit,
        /// Train/test cut-over (RFC 3339, defaults to 2025-01-01T00:00:00Z)
        #[arg(long, value_name = "TIMESTAMP")]
        split_at: Option<String>,
        /// Aggregate the input into hourly bars before simulating
        #[arg(long)]
        resample_hourly: bool,
        #[arg(long, value_enum, default_value_t = PolicyKind::Hold)]
        policy: PolicyKind,
        /// Seed for the random policy
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of parallel environments
        #[arg(long, default_value_t = 1)]
        envs: usize,
        /// Directory receiving the per-run report folder
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Convert a price CSV into a binary price series snapshot
    Snapshot {
        #[arg(long, value_name = "PATH")]
        data: PathBuf,
        /// Destination file for the snapshot
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
        /// Symbol stored in the snapshot (defaults to the CSV file name)
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        resample_hourly: bool,
    },
    /// Print bar count, time range and feature columns of a snapshot
    Inspect {
        #[arg(long, value_name = "PATH")]
        snapshot: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting fxgym. Simulated results only; not financial advice.");

    match cli.command {
        Commands::Backtest {
            data,
            instrument,
            config,
            overrides,
            split,
            split_at,
            resample_hourly,
            policy,
            seed,
            envs,
            output,
        } => {
            let options = BacktestOptions {
                data,
                instrument,
                config,
                overrides,
                split,
                split_at,
                resample_hourly,
                policy,
                seed,
                envs,
                output: output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            };
            backtest::run(&options)?;
        }
        Commands::Snapshot {
            data,
            output,
            symbol,
            resample_hourly,
        } => {
            snapshot::run(&data, &output, symbol.as_deref(), resample_hourly)?;
        }
        Commands::Inspect { snapshot } => {
            inspect::run(&snapshot)?;
        }
    }

    Ok(())
}
