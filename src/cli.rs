//! CLI command implementations
//!
//! Business logic for the subcommands, extracted from main.rs for
//! testability. Each function is one unit of work: resource-level errors
//! abort that unit, and the batch commands continue past per-experiment
//! failures.

use std::path::Path;

use crate::aggregate::{binned_series, BinnedSeries, BinningConfig, StatsRecord};
use crate::breakdown::compute_breakdown;
use crate::diff;
use crate::error::{MemlatError, Result};
use crate::event::{count_trace_lines, read_event_log, write_event_log, Kind};
use crate::matcher::{load_baseline_histograms, match_by_id, write_merged_dump, MatchedRequest};

/// Match one run's logs and write its inspection and statistics artifacts
///
/// Produces `merged_transactions.csv` plus one statistics record per kind
/// that had at least one matched request.
pub fn run_stats(dir: &Path, num_cycles: u64) -> Result<()> {
    let (matches, _issues) = match_run(dir)?;
    write_merged_dump(&matches, &dir.join("merged_transactions.csv"))?;

    let trace_lines = count_trace_lines(dir)?;
    for kind in [Kind::Read, Kind::Write] {
        match StatsRecord::compute(kind, &matches, num_cycles, trace_lines) {
            Some(record) => {
                let path = StatsRecord::path_for(dir, kind);
                record.save(&path)?;
                if let Some(stats) = record.kind_stats(kind) {
                    println!(
                        "{}: average {:.1}, p99 {:.1}, max {:.0}, bandwidth {:.6}",
                        kind.label(),
                        stats.average,
                        stats.p99,
                        stats.max,
                        record.bandwidth
                    );
                }
            }
            None => log::warn!("no matched {} requests in {}", kind.label(), dir.display()),
        }
    }
    Ok(())
}

/// Compute the time-binned latency series and optional traffic overlay
///
/// Writes `binned_latency.csv` (and `traffic_counts.csv` when the overlay
/// is enabled) into `out_dir`, which defaults to the run directory.
pub fn run_binned(dir: &Path, config: BinningConfig, out_dir: Option<&Path>) -> Result<()> {
    let (matches, issues) = match_run(dir)?;
    let series = binned_series(&matches, &issues, &config);
    let out = out_dir.unwrap_or(dir);
    std::fs::create_dir_all(out).map_err(|e| MemlatError::io(out, e))?;
    write_binned_csvs(&series, out)?;
    Ok(())
}

fn write_binned_csvs(series: &BinnedSeries, out: &Path) -> Result<()> {
    let latency_path = out.join("binned_latency.csv");
    let csv_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e| MemlatError::Csv {
            path: path.clone(),
            source: e,
        }
    };

    let mut wtr = csv::Writer::from_path(&latency_path).map_err(csv_err(&latency_path))?;
    for point in &series.latency {
        wtr.serialize(point).map_err(csv_err(&latency_path))?;
    }
    wtr.flush().map_err(|e| MemlatError::io(&latency_path, e))?;

    if let Some(traffic) = &series.traffic {
        let traffic_path = out.join("traffic_counts.csv");
        let mut wtr = csv::Writer::from_path(&traffic_path).map_err(csv_err(&traffic_path))?;
        wtr.write_record(["Cycle", "Requests"])
            .map_err(csv_err(&traffic_path))?;
        for (cycle, count) in traffic {
            wtr.write_record([cycle.to_string(), count.to_string()])
                .map_err(csv_err(&traffic_path))?;
        }
        wtr.flush().map_err(|e| MemlatError::io(&traffic_path, e))?;
    }
    Ok(())
}

/// Print the stage latency breakdown of one experiment's meta directory
pub fn run_breakdown(meta_dir: &Path) -> Result<()> {
    let breakdown = compute_breakdown(meta_dir)?;
    match breakdown.shares() {
        Some(shares) => {
            for (label, share) in shares {
                println!("{label:<10} {share:6.2}%");
            }
        }
        None => log::warn!(
            "all latency components are zero in {}; nothing to break down",
            meta_dir.display()
        ),
    }
    Ok(())
}

/// Diff one pair of run directories
///
/// The output directory defaults to the current run's directory, matching
/// the layout the batch mode expects.
pub fn run_diff(current_dir: &Path, baseline_dir: &Path, out_dir: Option<&Path>) -> Result<()> {
    let out = out_dir.unwrap_or(current_dir);
    diff::diff_run_dirs(current_dir, baseline_dir, out)
}

/// Batch diff over two manifest roots
pub fn run_diff_batch(current_root: &Path, baseline_root: &Path, out_dir: &Path) -> Result<()> {
    let manifest = diff::diff_experiments(current_root, baseline_root, out_dir)?;
    println!(
        "wrote diff manifest with {} entries to {}",
        manifest.experiments.len(),
        out_dir.join(crate::manifest::MANIFEST_FILE).display()
    );
    Ok(())
}

/// Expand a baseline histogram dump into surrogate issue/completion logs
pub fn run_convert_baseline(json_path: &Path, out_dir: &Path) -> Result<()> {
    let logs = load_baseline_histograms(json_path)?;
    std::fs::create_dir_all(out_dir).map_err(|e| MemlatError::io(out_dir, e))?;
    write_event_log(&logs.issues, &out_dir.join("input_request_stats.csv"))?;
    write_event_log(&logs.completions, &out_dir.join("output_request_stats.csv"))?;
    println!(
        "wrote {} surrogate rows to {}",
        logs.issues.len(),
        out_dir.display()
    );
    Ok(())
}

/// Read and identifier-join one run directory
fn match_run(dir: &Path) -> Result<(Vec<MatchedRequest>, Vec<crate::event::Event>)> {
    let issues = read_event_log(&dir.join("input_request_stats.csv"))?;
    let completions = read_event_log(&dir.join("output_request_stats.csv"))?;
    let matches = match_by_id(&issues.events, &completions.events);
    Ok((matches, issues.events))
}
