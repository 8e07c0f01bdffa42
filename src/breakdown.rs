//! Pipeline-stage latency decomposition (StageBreakdown)
//!
//! Decomposes end-to-end latency into queueing delay and per-stage delay
//! using the per-bank command queue logs written next to the top-level
//! issue/completion pair:
//!
//! - `bank_req_queue_stats*.csv` — stage command issues
//!   (`RequestID, Type, Cycle`)
//! - `bank_resp_queue_stats*.csv` — stage responses (`RequestID, Cycle`)
//!
//! Queueing delay is the gap from issue to the first entry-stage
//! (activate) command; a request with no entry-stage event is excluded
//! from the queueing sample, not treated as zero. Per-stage delay pairs
//! each command with the earliest response for the same request at a
//! strictly greater cycle. Stage types with no matches yield 0.0 so the
//! output stays fixed-width across configurations.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{MemlatError, Result};
use crate::event::{read_event_log, Event};
use crate::stats;

/// Filename prefix of stage command logs
pub const STAGE_REQUEST_PREFIX: &str = "bank_req_queue_stats";
/// Filename prefix of stage response logs
pub const STAGE_RESPONSE_PREFIX: &str = "bank_resp_queue_stats";

/// Pipeline stage of a command, a small fixed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageType {
    /// Row activation; the designated entry stage for queueing latency
    Activate,
    /// Column read
    Read,
    /// Column write
    Write,
    /// Row precharge
    Precharge,
    /// Refresh
    Refresh,
}

impl StageType {
    /// All stage types, in output order
    pub const ALL: [StageType; 5] = [
        StageType::Activate,
        StageType::Read,
        StageType::Write,
        StageType::Precharge,
        StageType::Refresh,
    ];

    /// Parse the log's `Type` column
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ACTIVATE" => Some(StageType::Activate),
            "READ" => Some(StageType::Read),
            "WRITE" => Some(StageType::Write),
            "PRECHARGE" => Some(StageType::Precharge),
            "REFRESH" => Some(StageType::Refresh),
            _ => None,
        }
    }

    /// Label used in breakdown output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageType::Activate => "ACTIVATE",
            StageType::Read => "READ",
            StageType::Write => "WRITE",
            StageType::Precharge => "PRECHARGE",
            StageType::Refresh => "REFRESH",
        }
    }
}

/// An intermediate pipeline transition, not visible in the top-level
/// issue/completion stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    /// Request the command belongs to
    pub request_id: u64,
    /// Which pipeline stage issued
    pub stage: StageType,
    /// Cycle the command issued
    pub cycle: u64,
}

/// A stage response, carrying only the request id and cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageResponse {
    /// Request the response belongs to
    pub request_id: u64,
    /// Cycle the response was observed
    pub cycle: u64,
}

#[derive(Debug, Deserialize)]
struct RawStageRow {
    #[serde(rename = "RequestID")]
    request_id: String,
    #[serde(rename = "Type")]
    stage: String,
    #[serde(rename = "Cycle")]
    cycle: String,
}

#[derive(Debug, Deserialize)]
struct RawResponseRow {
    #[serde(rename = "RequestID")]
    request_id: String,
    #[serde(rename = "Cycle")]
    cycle: String,
}

fn parse_u64(s: &str) -> Option<u64> {
    s.trim().parse::<u64>().ok()
}

/// List CSV files in `meta_dir` whose names start with `prefix`
fn prefixed_csvs(meta_dir: &Path, prefix: &str) -> Result<Vec<std::path::PathBuf>> {
    let entries = std::fs::read_dir(meta_dir).map_err(|e| MemlatError::io(meta_dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MemlatError::io(meta_dir, e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".csv"));
        if matches && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load every stage command event from the meta directory
///
/// Rows with non-numeric fields or unknown stage names are dropped, same
/// lenient policy as the event store.
pub fn load_stage_requests(meta_dir: &Path) -> Result<Vec<StageEvent>> {
    let mut events = Vec::new();
    for path in prefixed_csvs(meta_dir, STAGE_REQUEST_PREFIX)? {
        let file = File::open(&path).map_err(|e| MemlatError::io(&path, e))?;
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(BufReader::new(file));
        for record in rdr.deserialize::<RawStageRow>() {
            let Ok(raw) = record else { continue };
            let (Some(request_id), Some(stage), Some(cycle)) = (
                parse_u64(&raw.request_id),
                StageType::parse(&raw.stage),
                parse_u64(&raw.cycle),
            ) else {
                continue;
            };
            events.push(StageEvent {
                request_id,
                stage,
                cycle,
            });
        }
    }
    Ok(events)
}

/// Load every stage response from the meta directory
pub fn load_stage_responses(meta_dir: &Path) -> Result<Vec<StageResponse>> {
    let mut responses = Vec::new();
    for path in prefixed_csvs(meta_dir, STAGE_RESPONSE_PREFIX)? {
        let file = File::open(&path).map_err(|e| MemlatError::io(&path, e))?;
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(BufReader::new(file));
        for record in rdr.deserialize::<RawResponseRow>() {
            let Ok(raw) = record else { continue };
            let (Some(request_id), Some(cycle)) =
                (parse_u64(&raw.request_id), parse_u64(&raw.cycle))
            else {
                continue;
            };
            responses.push(StageResponse { request_id, cycle });
        }
    }
    Ok(responses)
}

/// Queueing latency sample: first entry-stage cycle minus issue cycle,
/// per request
///
/// Requests with no entry-stage event are excluded from the sample.
#[must_use]
pub fn queueing_latencies(issues: &[Event], commands: &[StageEvent]) -> Vec<f64> {
    let mut first_entry: HashMap<u64, u64> = HashMap::new();
    for cmd in commands {
        if cmd.stage != StageType::Activate {
            continue;
        }
        first_entry
            .entry(cmd.request_id)
            .and_modify(|c| *c = (*c).min(cmd.cycle))
            .or_insert(cmd.cycle);
    }

    issues
        .iter()
        .filter_map(|issue| {
            first_entry
                .get(&issue.request_id)
                .map(|&entry| entry as f64 - issue.cycle as f64)
        })
        .collect()
}

/// Mean per-stage latency via ordered nearest-successor matching
///
/// For each command, the earliest response of the same request with a
/// strictly greater cycle is its completion. Stage types with no matches
/// yield 0.0, not an error, to keep a fixed-width output.
#[must_use]
pub fn stage_latencies(
    commands: &[StageEvent],
    responses: &[StageResponse],
) -> HashMap<StageType, f64> {
    let mut by_request: HashMap<u64, Vec<u64>> = HashMap::new();
    for resp in responses {
        by_request.entry(resp.request_id).or_default().push(resp.cycle);
    }
    for cycles in by_request.values_mut() {
        cycles.sort_unstable();
    }

    let mut samples: HashMap<StageType, Vec<f64>> = HashMap::new();
    for cmd in commands {
        let Some(cycles) = by_request.get(&cmd.request_id) else {
            continue;
        };
        // First response strictly after the command issue
        let idx = cycles.partition_point(|&c| c <= cmd.cycle);
        if let Some(&resp_cycle) = cycles.get(idx) {
            samples
                .entry(cmd.stage)
                .or_default()
                .push((resp_cycle - cmd.cycle) as f64);
        }
    }

    StageType::ALL
        .iter()
        .map(|&stage| {
            let mean = samples
                .get(&stage)
                .and_then(|s| stats::mean(s))
                .unwrap_or(0.0);
            (stage, mean)
        })
        .collect()
}

/// Mean queueing and per-stage latency for one experiment
#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    /// Mean queueing latency (0.0 when no request had an entry-stage event)
    pub queue: f64,
    /// Mean latency per stage type, fixed-width over [`StageType::ALL`]
    pub stages: HashMap<StageType, f64>,
}

impl Breakdown {
    /// Output labels in order: queue, then each stage type
    #[must_use]
    pub fn labels() -> Vec<&'static str> {
        let mut labels = vec!["queue"];
        labels.extend(StageType::ALL.iter().map(|s| s.as_str()));
        labels
    }

    /// Component values in label order
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        let mut values = vec![self.queue];
        values.extend(
            StageType::ALL
                .iter()
                .map(|s| self.stages.get(s).copied().unwrap_or(0.0)),
        );
        values
    }

    /// Percentage-of-total shares per component, summing to 100%
    ///
    /// `None` when every component is zero (nothing to normalize).
    #[must_use]
    pub fn shares(&self) -> Option<Vec<(&'static str, f64)>> {
        let values = self.values();
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(
            Self::labels()
                .into_iter()
                .zip(values)
                .map(|(label, v)| (label, v / total * 100.0))
                .collect(),
        )
    }
}

/// Compute the breakdown for one experiment's meta directory
///
/// Requires `input_request_stats.csv` plus any number of stage logs.
pub fn compute_breakdown(meta_dir: &Path) -> Result<Breakdown> {
    let issue_log = meta_dir.join("input_request_stats.csv");
    let issues = read_event_log(&issue_log)?;
    let commands = load_stage_requests(meta_dir)?;
    let responses = load_stage_responses(meta_dir)?;

    let queue_sample = queueing_latencies(&issues.events, &commands);
    let queue = stats::mean(&queue_sample).unwrap_or(0.0);
    let stages = stage_latencies(&commands, &responses);

    Ok(Breakdown { queue, stages })
}
