//! Memlat CLI - latency analysis for memory-system simulators
//!
//! # Commands
//!
//! - `stats` - Match one run's logs and persist its latency statistics
//! - `binned` - Time-binned average latency, optional traffic overlay
//! - `breakdown` - Queueing and pipeline-stage latency shares
//! - `diff` - Compare one run pair (current vs baseline)
//! - `diff-batch` - Compare every experiment shared by two manifests
//! - `convert-baseline` - Expand a baseline histogram dump into logs

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use memlat::aggregate::BinningConfig;
use memlat::cli;
use memlat::error::Result;

/// Memlat - latency reconstruction and cross-simulator comparison
///
/// Batch analysis over completed simulation runs; all inputs are the
/// simulator's on-disk event logs and manifests.
#[derive(Parser)]
#[command(name = "memlat")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match issue/completion logs and write per-kind latency statistics
    ///
    /// Examples:
    ///   memlat stats ./exp_conv2d --num-cycles 2000000
    Stats {
        /// Run directory containing input/output_request_stats.csv
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Total simulated cycles of the run (bandwidth denominator)
        #[arg(long)]
        num_cycles: u64,
    },
    /// Time-binned average latency over issue cycles
    ///
    /// Examples:
    ///   memlat binned ./exp_conv2d --scale 100 --traffic
    Binned {
        /// Run directory containing input/output_request_stats.csv
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Bin width in cycles
        #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
        scale: u64,

        /// Also write per-bin issued-request counts
        #[arg(long)]
        traffic: bool,

        /// Output directory (default: the run directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Queueing and per-stage latency breakdown of one experiment
    Breakdown {
        /// Meta directory holding the issue log and bank queue logs
        #[arg(value_name = "META_DIR")]
        meta_dir: PathBuf,
    },
    /// Latency difference between one current/baseline run pair
    Diff {
        /// Directory of the current simulator's CSVs
        #[arg(long)]
        current_dir: PathBuf,

        /// Directory of the baseline simulator's CSVs
        #[arg(long)]
        baseline_dir: PathBuf,

        /// Where to write the diff CSVs (default: current-dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Latency diffs for every experiment shared by two manifests
    DiffBatch {
        /// Directory containing the current simulator's breadcrumb.json
        #[arg(long)]
        current_dir: PathBuf,

        /// Directory containing the baseline simulator's breadcrumb.json
        #[arg(long)]
        baseline_dir: PathBuf,

        /// Where to write per-experiment diffs and the new breadcrumb.json
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Expand a baseline latency-histogram dump into surrogate logs
    ConvertBaseline {
        /// Histogram JSON produced by the baseline simulator
        #[arg(value_name = "JSON")]
        json: PathBuf,

        /// Directory to write the surrogate CSV pair into
        #[arg(value_name = "OUT_DIR")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stats { dir, num_cycles } => cli::run_stats(&dir, num_cycles),
        Commands::Binned {
            dir,
            scale,
            traffic,
            out_dir,
        } => {
            let config = BinningConfig {
                scale,
                include_traffic: traffic,
            };
            cli::run_binned(&dir, config, out_dir.as_deref())
        }
        Commands::Breakdown { meta_dir } => cli::run_breakdown(&meta_dir),
        Commands::Diff {
            current_dir,
            baseline_dir,
            out_dir,
        } => cli::run_diff(&current_dir, &baseline_dir, out_dir.as_deref()),
        Commands::DiffBatch {
            current_dir,
            baseline_dir,
            out_dir,
        } => cli::run_diff_batch(&current_dir, &baseline_dir, &out_dir),
        Commands::ConvertBaseline { json, out_dir } => {
            cli::run_convert_baseline(&json, &out_dir)
        }
    }
}
