//! Cross-run comparison (CrossRunDiffer)
//!
//! Aligns two runs of the same nominal workload produced by independent
//! simulators and summarizes their elementwise latency differences.
//!
//! The alignment is positional: each run's per-kind latency sample is
//! independently ordered by completion cycle, then truncated to the
//! shorter length. The two simulators need not agree on request
//! identifiers, so this is a statistical-comparison approximation — the
//! i-th pair is not guaranteed to be the same logical request. That
//! limitation is inherent to comparing heterogeneous simulators and is
//! deliberately not papered over with stronger semantics.

use std::path::Path;

use serde::Serialize;

use crate::aggregate::StatsRecord;
use crate::error::{MemlatError, Result};
use crate::event::{read_event_log, Kind};
use crate::manifest::Manifest;
use crate::matcher::{kind_latencies, match_by_id, write_merged_dump};
use crate::stats;

/// Per-kind latency samples of one run, each ordered by completion cycle
#[derive(Debug, Clone, Default)]
pub struct RunLatencies {
    /// Read latencies
    pub reads: Vec<f64>,
    /// Write latencies
    pub writes: Vec<f64>,
}

impl RunLatencies {
    /// Sample for one kind
    #[must_use]
    pub fn kind(&self, kind: Kind) -> &[f64] {
        match kind {
            Kind::Read => &self.reads,
            Kind::Write => &self.writes,
        }
    }
}

/// Load and match one run's issue/completion logs into per-kind latencies
///
/// Also dumps `merged_transactions.csv` into the run directory to help
/// inspect merge quality; nothing downstream consumes that file.
pub fn load_latencies(dir: &Path) -> Result<RunLatencies> {
    let issues = read_event_log(&dir.join("input_request_stats.csv"))?;
    let completions = read_event_log(&dir.join("output_request_stats.csv"))?;

    let matches = match_by_id(&issues.events, &completions.events);
    write_merged_dump(&matches, &dir.join("merged_transactions.csv"))?;

    Ok(RunLatencies {
        reads: kind_latencies(&matches, Kind::Read),
        writes: kind_latencies(&matches, Kind::Write),
    })
}

/// Summary of an elementwise latency difference
#[derive(Debug, Clone, PartialEq)]
pub struct DiffSummary {
    /// Mean of `current[i] - baseline[i]`
    pub mean: f64,
    /// Population variance of the differences
    pub variance: f64,
    /// Population standard deviation of the differences
    pub stddev: f64,
    /// Number of aligned pairs
    pub count: usize,
    /// Current bandwidth minus baseline bandwidth, when both persisted it
    pub bandwidth_diff: Option<f64>,
    /// Current utilization minus baseline utilization, when both persisted it
    pub utilization_diff: Option<f64>,
}

/// Elementwise difference over the aligned range, truncated to the
/// shorter sample
#[must_use]
pub fn elementwise_diff(current: &[f64], baseline: &[f64]) -> Vec<f64> {
    current
        .iter()
        .zip(baseline)
        .map(|(c, b)| c - b)
        .collect()
}

/// Summarize the elementwise difference of two aligned samples
///
/// `None` when the aligned range is empty — no data is not a zero diff.
#[must_use]
pub fn summarize(current: &[f64], baseline: &[f64]) -> Option<DiffSummary> {
    let diffs = elementwise_diff(current, baseline);
    Some(DiffSummary {
        mean: stats::mean(&diffs)?,
        variance: stats::population_variance(&diffs)?,
        stddev: stats::population_stddev(&diffs)?,
        count: diffs.len(),
        bandwidth_diff: None,
        utilization_diff: None,
    })
}

/// Pull derived-rate differences from the two runs' persisted statistics
///
/// When either side's record is absent the rate diff is skipped with a
/// warning rather than failing the comparison.
pub fn attach_rate_diffs(
    summary: &mut DiffSummary,
    current_dir: &Path,
    baseline_dir: &Path,
    kind: Kind,
) {
    let current = StatsRecord::load(&StatsRecord::path_for(current_dir, kind));
    let baseline = StatsRecord::load(&StatsRecord::path_for(baseline_dir, kind));
    match (current, baseline) {
        (Ok(cur), Ok(base)) => {
            summary.bandwidth_diff = Some(cur.bandwidth - base.bandwidth);
            summary.utilization_diff = match (cur.utilization, base.utilization) {
                (Some(c), Some(b)) => Some(c - b),
                _ => None,
            };
        }
        _ => {
            log::warn!(
                "no persisted {} statistics for both runs; skipping rate diffs",
                kind.label()
            );
        }
    }
}

#[derive(Debug, Serialize)]
struct DiffRow<'a> {
    metric: &'a str,
    value: f64,
}

/// Write the summary as `metric, value` rows
pub fn write_diff_csv(summary: &DiffSummary, path: &Path) -> Result<()> {
    let csv_err = |e| MemlatError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    let mut rows = vec![
        ("mean", summary.mean),
        ("variance", summary.variance),
        ("stddev", summary.stddev),
    ];
    if let Some(bw) = summary.bandwidth_diff {
        rows.push(("bandwidth_diff", bw));
    }
    if let Some(util) = summary.utilization_diff {
        rows.push(("utilization_diff", util));
    }
    for (metric, value) in rows {
        wtr.serialize(DiffRow { metric, value }).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| MemlatError::io(path, e))?;
    Ok(())
}

/// Diff one pair of run directories, writing `read_diff_stats.csv` and
/// `write_diff_stats.csv` into `out_dir`
pub fn diff_run_dirs(current_dir: &Path, baseline_dir: &Path, out_dir: &Path) -> Result<()> {
    let current = load_latencies(current_dir)?;
    let baseline = load_latencies(baseline_dir)?;
    std::fs::create_dir_all(out_dir).map_err(|e| MemlatError::io(out_dir, e))?;

    for kind in [Kind::Read, Kind::Write] {
        let cur = current.kind(kind);
        let base = baseline.kind(kind);
        let Some(mut summary) = summarize(cur, base) else {
            log::warn!(
                "no aligned {} requests between {} and {}; skipping",
                kind.label(),
                current_dir.display(),
                baseline_dir.display()
            );
            continue;
        };
        attach_rate_diffs(&mut summary, current_dir, baseline_dir, kind);

        if let Some(welch) = stats::welch_t_test(cur, base) {
            log::info!(
                "{} latency difference: t = {:.3}, p = {:.4}{}",
                kind.label(),
                welch.t_statistic,
                welch.p_value,
                if welch.significant { " (significant)" } else { "" }
            );
        }

        let path = out_dir.join(format!("{}_diff_stats.csv", kind.label()));
        write_diff_csv(&summary, &path)?;
    }
    Ok(())
}

/// Batch diff over two manifests
///
/// Computes the single-pair diff for every experiment name present in
/// both manifests. Names present in only one manifest are reported and
/// skipped; a failure on one experiment skips that experiment, never the
/// batch. Results are indexed into a new manifest at `out_dir`.
pub fn diff_experiments(
    current_root: &Path,
    baseline_root: &Path,
    out_dir: &Path,
) -> Result<Manifest> {
    let current_map = Manifest::load(current_root)?.by_name();
    let baseline_map = Manifest::load(baseline_root)?.by_name();

    for name in current_map.keys().filter(|n| !baseline_map.contains_key(*n)) {
        log::warn!("experiment {name} only in current manifest; skipped");
    }
    for name in baseline_map.keys().filter(|n| !current_map.contains_key(*n)) {
        log::warn!("experiment {name} only in baseline manifest; skipped");
    }

    let common: Vec<&String> = current_map
        .keys()
        .filter(|n| baseline_map.contains_key(*n))
        .collect();
    if common.is_empty() {
        return Err(MemlatError::NoCommonExperiments {
            current: current_root.to_path_buf(),
            baseline: baseline_root.to_path_buf(),
        });
    }

    std::fs::create_dir_all(out_dir).map_err(|e| MemlatError::io(out_dir, e))?;
    let mut result = Manifest::default();
    for name in common {
        let diff_dir = out_dir.join(name);
        match diff_run_dirs(&current_map[name], &baseline_map[name], &diff_dir) {
            Ok(()) => result.experiments.push(diff_dir),
            Err(e) => log::error!("experiment {name} failed: {e}; continuing"),
        }
    }
    result.save(out_dir)?;
    Ok(result)
}
