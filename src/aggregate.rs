//! Latency aggregation (Aggregator)
//!
//! Scalar distributions, time-binned averages with an optional traffic
//! overlay, and the derived rates (bandwidth, utilization) persisted as a
//! per-kind statistics record for the cross-run differ.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MemlatError, Result};
use crate::event::{Event, Kind};
use crate::matcher::{kind_latencies, MatchedRequest};
use crate::stats;

/// Scalar latency distribution for one kind
///
/// Derived, recomputed on demand, never persisted mutably.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    /// Arithmetic mean
    pub mean: f64,
    /// 99th percentile (linear interpolation over the sorted sample)
    pub p99: f64,
    /// Maximum observed latency
    pub max: f64,
    /// Sample count
    pub count: usize,
}

impl Distribution {
    /// Compute over a latency sample, `None` when the sample is empty
    #[must_use]
    pub fn from_latencies(latencies: &[f64]) -> Option<Self> {
        Some(Self {
            mean: stats::mean(latencies)?,
            p99: stats::percentile(latencies, 99.0)?,
            max: stats::max(latencies)?,
            count: latencies.len(),
        })
    }
}

// ============================================================================
// Time-binned series
// ============================================================================

/// Binning parameters, threaded explicitly into every series computation
#[derive(Debug, Clone, Copy)]
pub struct BinningConfig {
    /// Bin width in cycles; `bin = floor(issue_cycle / scale) * scale`.
    /// A width of 0 is treated as 1 (per-cycle bins).
    pub scale: u64,
    /// Whether to also compute per-bin issue counts for a traffic overlay
    pub include_traffic: bool,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            scale: 100,
            include_traffic: false,
        }
    }
}

/// One bin of the latency-over-time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BinnedPoint {
    /// Bin start cycle
    #[serde(rename = "Cycle")]
    pub cycle: u64,
    /// Average latency of requests issued in this bin
    #[serde(rename = "AvgLatency")]
    pub avg_latency: f64,
}

/// Binned averages plus the optional traffic overlay
#[derive(Debug, Clone, Default)]
pub struct BinnedSeries {
    /// (bin, average latency), sorted by bin ascending
    pub latency: Vec<BinnedPoint>,
    /// (bin, issued request count), present when the overlay was requested
    pub traffic: Option<Vec<(u64, u64)>>,
}

/// Group matched latencies by issue-cycle bin and average within each bin
#[must_use]
pub fn binned_average(matches: &[MatchedRequest], scale: u64) -> Vec<BinnedPoint> {
    // A zero width degenerates to per-cycle bins rather than dividing by zero
    let scale = scale.max(1);
    let mut bins: BTreeMap<u64, (f64, u64)> = BTreeMap::new();
    for m in matches {
        let bin = m.issue_cycle / scale * scale;
        let entry = bins.entry(bin).or_insert((0.0, 0));
        entry.0 += m.latency() as f64;
        entry.1 += 1;
    }
    bins.into_iter()
        .map(|(cycle, (sum, n))| BinnedPoint {
            cycle,
            avg_latency: sum / n as f64,
        })
        .collect()
}

/// Per-bin issue counts, independent of latency, for overlaying request
/// volume against the latency series
#[must_use]
pub fn traffic_counts(issues: &[Event], scale: u64) -> Vec<(u64, u64)> {
    let scale = scale.max(1);
    let mut bins: BTreeMap<u64, u64> = BTreeMap::new();
    for e in issues {
        *bins.entry(e.cycle / scale * scale).or_insert(0) += 1;
    }
    bins.into_iter().collect()
}

/// Compute the binned series per the configuration
#[must_use]
pub fn binned_series(
    matches: &[MatchedRequest],
    issues: &[Event],
    config: &BinningConfig,
) -> BinnedSeries {
    BinnedSeries {
        latency: binned_average(matches, config.scale),
        traffic: config
            .include_traffic
            .then(|| traffic_counts(issues, config.scale)),
    }
}

// ============================================================================
// Persisted statistics record
// ============================================================================

/// Scalar stats as persisted in the statistics record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    /// Mean latency
    pub average: f64,
    /// 99th percentile latency
    pub p99: f64,
    /// Maximum latency
    pub max: f64,
}

impl From<Distribution> for KindStats {
    fn from(d: Distribution) -> Self {
        Self {
            average: d.mean,
            p99: d.p99,
            max: d.max,
        }
    }
}

/// Per-experiment statistics record, one file per kind
///
/// Serialized shape: `{ "<kind>_latency": {average, p99, max},
/// "num_cycles": N, "bandwidth": B, "utilization": U? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Latency stats keyed by `read_latency` / `write_latency`
    #[serde(flatten)]
    pub latency: BTreeMap<String, KindStats>,
    /// Total simulated cycles of the run
    pub num_cycles: u64,
    /// Matched requests divided by total simulated cycles
    pub bandwidth: f64,
    /// Matched requests divided by raw trace line count, when a trace
    /// file was present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

impl StatsRecord {
    /// Build the record for one kind from the matched set
    ///
    /// Returns `None` when no request of this kind was matched: an empty
    /// sample has no statistics, and writing zeros would be misleading.
    #[must_use]
    pub fn compute(
        kind: Kind,
        matches: &[MatchedRequest],
        num_cycles: u64,
        trace_lines: Option<usize>,
    ) -> Option<Self> {
        let latencies = kind_latencies(matches, kind);
        let dist = Distribution::from_latencies(&latencies)?;
        let count = dist.count as f64;

        let bandwidth = if num_cycles > 0 {
            count / num_cycles as f64
        } else {
            0.0
        };
        let utilization = trace_lines
            .filter(|&total| total > 0)
            .map(|total| count / total as f64);

        let mut latency = BTreeMap::new();
        latency.insert(format!("{}_latency", kind.label()), KindStats::from(dist));
        Some(Self {
            latency,
            num_cycles,
            bandwidth,
            utilization,
        })
    }

    /// Canonical path of the record for one kind within an experiment dir
    #[must_use]
    pub fn path_for(dir: &Path, kind: Kind) -> PathBuf {
        dir.join(format!("{}_latency.stats.json", kind.label()))
    }

    /// Persist as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| MemlatError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| MemlatError::io(path, e))
    }

    /// Load a previously persisted record
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MemlatError::MissingResource {
                what: "statistics record",
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|e| MemlatError::io(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| MemlatError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Stats for the given kind, if this record carries them
    #[must_use]
    pub fn kind_stats(&self, kind: Kind) -> Option<&KindStats> {
        self.latency.get(&format!("{}_latency", kind.label()))
    }
}
