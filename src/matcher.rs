//! Request matching (RequestMatcher)
//!
//! Joins issue and completion events into per-request latencies under two
//! interchangeable algorithms:
//!
//! - **Identifier join**: join on `RequestID`, resolving duplicate
//!   completions to the earliest cycle, discarding pairs whose addresses
//!   disagree.
//! - **Positional join**: for logs without stable identifiers, pair the
//!   k-th earliest issue with the k-th earliest completion of the same
//!   kind. This is a documented approximation: it is exact only when
//!   completions are strictly ordered and equal in count to issues, and
//!   will misattribute latency under reordering.
//!
//! Both modes split requests into read/write subsets *before* matching,
//! so all downstream statistics are computed independently per kind.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::{MemlatError, Result};
use crate::event::{Event, Kind};

/// A matched issue/completion pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedRequest {
    /// Identifier shared by the issue and completion events
    pub request_id: u64,
    /// Address from the issue record (equal to the completion's by construction)
    pub address: u64,
    /// Kind from the issue record
    pub kind: Kind,
    /// Cycle the request was issued
    pub issue_cycle: u64,
    /// Cycle the request completed
    pub completion_cycle: u64,
}

impl MatchedRequest {
    /// Completion cycle minus issue cycle
    ///
    /// Signed: malformed input can yield a completion before its issue,
    /// and the lenient policy keeps such pairs visible rather than
    /// silently clamping them.
    #[must_use]
    pub fn latency(&self) -> i64 {
        self.completion_cycle as i64 - self.issue_cycle as i64
    }
}

/// Identifier-based join on `RequestID`
///
/// Duplicate completions for one request (retries or resubmissions in the
/// underlying protocol) resolve to the entry with the minimum cycle:
/// earliest completion wins. Pairs whose addresses disagree are discarded.
#[must_use]
pub fn match_by_id(issues: &[Event], completions: &[Event]) -> Vec<MatchedRequest> {
    // Earliest completion per request id
    let mut earliest: HashMap<u64, Event> = HashMap::with_capacity(completions.len());
    for &c in completions {
        earliest
            .entry(c.request_id)
            .and_modify(|prev| {
                if c.cycle < prev.cycle {
                    *prev = c;
                }
            })
            .or_insert(c);
    }

    let mut matches = Vec::with_capacity(issues.len());
    for &issue in issues {
        let Some(&completion) = earliest.get(&issue.request_id) else {
            continue; // in-flight request that never completed
        };
        if completion.address != issue.address {
            continue; // disagreeing addresses: discard the pair
        }
        matches.push(MatchedRequest {
            request_id: issue.request_id,
            address: issue.address,
            kind: issue.kind,
            issue_cycle: issue.cycle,
            completion_cycle: completion.cycle,
        });
    }
    matches
}

/// Positional join for logs lacking stable identifiers
///
/// Each side is split by its own kind flag and sorted by its own cycle;
/// the k-th earliest issue pairs with the k-th earliest completion,
/// truncated to `min(n_issue, n_completion)`. The surviving pair carries
/// the issue record's id and address.
#[must_use]
pub fn match_positional(issues: &[Event], completions: &[Event]) -> Vec<MatchedRequest> {
    let mut matches = Vec::new();
    for kind in [Kind::Read, Kind::Write] {
        let mut kin: Vec<Event> = issues.iter().copied().filter(|e| e.kind == kind).collect();
        let mut kout: Vec<Event> = completions
            .iter()
            .copied()
            .filter(|e| e.kind == kind)
            .collect();
        kin.sort_by_key(|e| e.cycle);
        kout.sort_by_key(|e| e.cycle);

        let n = kin.len().min(kout.len());
        matches.extend(kin.iter().zip(&kout).take(n).map(|(i, c)| MatchedRequest {
            request_id: i.request_id,
            address: i.address,
            kind,
            issue_cycle: i.cycle,
            completion_cycle: c.cycle,
        }));
    }
    matches
}

/// Latencies for one kind, ordered by completion cycle ascending
///
/// This ordering is what the cross-run differ aligns on.
#[must_use]
pub fn kind_latencies(matches: &[MatchedRequest], kind: Kind) -> Vec<f64> {
    let mut subset: Vec<&MatchedRequest> = matches.iter().filter(|m| m.kind == kind).collect();
    subset.sort_by_key(|m| m.completion_cycle);
    subset.iter().map(|m| m.latency() as f64).collect()
}

// ============================================================================
// Histogram reconstruction (positional-join input synthesis)
// ============================================================================

/// Per-channel latency histograms from a baseline simulator that only
/// emits bucketed summaries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelHistograms {
    /// Read latency value -> request count
    #[serde(default)]
    pub read_latency: BTreeMap<String, u64>,
    /// Write latency value -> request count
    #[serde(default)]
    pub write_latency: BTreeMap<String, u64>,
}

/// Surrogate issue/completion logs reconstructed from histograms
#[derive(Debug, Clone, Default)]
pub struct SurrogateLogs {
    /// Synthesized issue events (cycle 0, dummy address)
    pub issues: Vec<Event>,
    /// Synthesized completion events (cycle = bucket latency)
    pub completions: Vec<Event>,
}

impl SurrogateLogs {
    /// Expand `(latency, count)` buckets into `count` individual rows
    ///
    /// Each row gets a fresh sequential identifier, a fixed dummy address
    /// of 0, issue cycle 0, and completion cycle equal to the bucket's
    /// latency. This treats the aggregate histogram as if it were the
    /// underlying per-request trace: a necessary approximation when only
    /// summary data is available.
    pub fn expand(&mut self, kind: Kind, buckets: &BTreeMap<u64, u64>) {
        for (&latency, &count) in buckets {
            for _ in 0..count {
                let request_id = self.issues.len() as u64;
                self.issues.push(Event {
                    request_id,
                    address: 0,
                    kind,
                    cycle: 0,
                });
                self.completions.push(Event {
                    request_id,
                    address: 0,
                    kind,
                    cycle: latency,
                });
            }
        }
    }
}

/// Load a baseline histogram dump (one JSON object per channel) and expand
/// it into surrogate logs
///
/// Buckets with non-numeric latency keys are dropped, consistent with the
/// lenient row policy of the event store.
pub fn load_baseline_histograms(path: &Path) -> Result<SurrogateLogs> {
    if !path.exists() {
        return Err(MemlatError::MissingResource {
            what: "baseline histogram dump",
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| MemlatError::io(path, e))?;
    let channels: BTreeMap<String, Option<ChannelHistograms>> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| MemlatError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut logs = SurrogateLogs::default();
    for histograms in channels.into_values().flatten() {
        logs.expand(Kind::Read, &numeric_buckets(&histograms.read_latency));
        logs.expand(Kind::Write, &numeric_buckets(&histograms.write_latency));
    }
    Ok(logs)
}

fn numeric_buckets(raw: &BTreeMap<String, u64>) -> BTreeMap<u64, u64> {
    raw.iter()
        .filter_map(|(latency, &count)| latency.trim().parse::<u64>().ok().map(|l| (l, count)))
        .collect()
}

// ============================================================================
// Merged-transaction dump (inspection artifact)
// ============================================================================

/// Row of the merged-transaction dump
#[derive(Debug, Serialize)]
struct MergedRow {
    #[serde(rename = "RequestID")]
    request_id: u64,
    #[serde(rename = "Address")]
    address: u64,
    #[serde(rename = "Read")]
    read: u8,
    #[serde(rename = "Write")]
    write: u8,
    #[serde(rename = "Cycle_in")]
    cycle_in: u64,
    #[serde(rename = "Cycle_out")]
    cycle_out: u64,
    latency: i64,
}

/// Write the matched set as `merged_transactions.csv`, sorted by request
/// id, to help inspect merge quality
///
/// Nothing downstream consumes this file.
pub fn write_merged_dump(matches: &[MatchedRequest], path: &Path) -> Result<()> {
    let mut sorted: Vec<&MatchedRequest> = matches.iter().collect();
    sorted.sort_by_key(|m| m.request_id);

    let mut wtr = csv::Writer::from_path(path).map_err(|e| MemlatError::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;
    for m in sorted {
        wtr.serialize(MergedRow {
            request_id: m.request_id,
            address: m.address,
            read: u8::from(m.kind == Kind::Read),
            write: u8::from(m.kind == Kind::Write),
            cycle_in: m.issue_cycle,
            cycle_out: m.completion_cycle,
            latency: m.latency(),
        })
        .map_err(|e| MemlatError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    wtr.flush().map_err(|e| MemlatError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ev(request_id: u64, address: u64, kind: Kind, cycle: u64) -> Event {
        Event {
            request_id,
            address,
            kind,
            cycle,
        }
    }

    #[test]
    fn test_id_join_basic() {
        let issues = vec![ev(1, 0, Kind::Read, 10), ev(2, 0, Kind::Write, 12)];
        let completions = vec![ev(1, 0, Kind::Read, 25), ev(2, 0, Kind::Write, 20)];
        let matches = match_by_id(&issues, &completions);
        assert_eq!(kind_latencies(&matches, Kind::Read), vec![15.0]);
        assert_eq!(kind_latencies(&matches, Kind::Write), vec![8.0]);
    }

    #[test]
    fn test_id_join_duplicate_completions_keep_minimum() {
        let issues = vec![ev(7, 4, Kind::Read, 0)];
        let completions = vec![
            ev(7, 4, Kind::Read, 50),
            ev(7, 4, Kind::Read, 30),
            ev(7, 4, Kind::Read, 80),
        ];
        let matches = match_by_id(&issues, &completions);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].completion_cycle, 30);
    }

    #[test]
    fn test_id_join_discards_address_mismatch() {
        let issues = vec![ev(1, 64, Kind::Read, 0), ev(2, 64, Kind::Read, 0)];
        let completions = vec![ev(1, 65, Kind::Read, 10), ev(2, 64, Kind::Read, 10)];
        let matches = match_by_id(&issues, &completions);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].request_id, 2);
    }

    #[test]
    fn test_id_join_skips_never_completed() {
        let issues = vec![ev(1, 0, Kind::Read, 0), ev(2, 0, Kind::Read, 5)];
        let completions = vec![ev(2, 0, Kind::Read, 9)];
        let matches = match_by_id(&issues, &completions);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].latency(), 4);
    }

    #[test]
    fn test_positional_join_pairs_by_rank() {
        // Issues arrive out of order; pairing is by sorted cycle per kind
        let issues = vec![
            ev(10, 0, Kind::Read, 8),
            ev(11, 0, Kind::Read, 2),
            ev(12, 0, Kind::Write, 5),
        ];
        let completions = vec![
            ev(90, 0, Kind::Read, 20),
            ev(91, 0, Kind::Read, 12),
            ev(92, 0, Kind::Write, 30),
        ];
        let matches = match_positional(&issues, &completions);
        // Reads: (2, 12) and (8, 20); write: (5, 30)
        assert_eq!(kind_latencies(&matches, Kind::Read), vec![10.0, 12.0]);
        assert_eq!(kind_latencies(&matches, Kind::Write), vec![25.0]);
    }

    #[test]
    fn test_positional_join_truncates_to_shorter_side() {
        let issues = vec![
            ev(1, 0, Kind::Read, 1),
            ev(2, 0, Kind::Read, 2),
            ev(3, 0, Kind::Read, 3),
        ];
        let completions = vec![ev(1, 0, Kind::Read, 4)];
        let matches = match_positional(&issues, &completions);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].latency(), 3);
    }

    #[test]
    fn test_matching_modes_agree_on_ordered_equal_counts() {
        // With unique ids, no duplicates, equal counts, and completions in
        // issue order, the two modes must reconstruct the same latencies.
        let issues: Vec<Event> = (0..20)
            .map(|i| {
                let kind = if i % 3 == 0 { Kind::Write } else { Kind::Read };
                ev(i, i * 8, kind, i)
            })
            .collect();
        let completions: Vec<Event> = issues
            .iter()
            .map(|e| ev(e.request_id, e.address, e.kind, e.cycle + 40))
            .collect();

        let by_id = match_by_id(&issues, &completions);
        let positional = match_positional(&issues, &completions);
        for kind in [Kind::Read, Kind::Write] {
            assert_eq!(
                kind_latencies(&by_id, kind),
                kind_latencies(&positional, kind)
            );
        }
    }

    #[test]
    fn test_histogram_expansion_round_trip_mean() {
        // {latency 5: count 3, latency 10: count 2} -> mean (5*3+10*2)/5 = 7.0
        let mut logs = SurrogateLogs::default();
        logs.expand(Kind::Read, &BTreeMap::from([(5, 3), (10, 2)]));
        assert_eq!(logs.issues.len(), 5);

        let matches = match_positional(&logs.issues, &logs.completions);
        let latencies = kind_latencies(&matches, Kind::Read);
        let mean = crate::stats::mean(&latencies).unwrap();
        assert_eq!(mean, 7.0);
    }

    #[test]
    fn test_histogram_expansion_assigns_fresh_ids() {
        let mut logs = SurrogateLogs::default();
        logs.expand(Kind::Read, &BTreeMap::from([(5, 2)]));
        logs.expand(Kind::Write, &BTreeMap::from([(9, 1)]));
        let ids: Vec<u64> = logs.issues.iter().map(|e| e.request_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(logs.issues.iter().all(|e| e.cycle == 0 && e.address == 0));
    }

    #[test]
    fn test_load_baseline_histograms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dramsim3.json");
        std::fs::write(
            &path,
            r#"{
                "0": {"read_latency": {"37": 2}, "write_latency": {"50": 1}},
                "1": null
            }"#,
        )
        .unwrap();

        let logs = load_baseline_histograms(&path).unwrap();
        assert_eq!(logs.issues.len(), 3);
        let matches = match_positional(&logs.issues, &logs.completions);
        assert_eq!(kind_latencies(&matches, Kind::Read), vec![37.0, 37.0]);
        assert_eq!(kind_latencies(&matches, Kind::Write), vec![50.0]);
    }

    #[test]
    fn test_merged_dump_sorted_by_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged_transactions.csv");
        let matches = vec![
            MatchedRequest {
                request_id: 9,
                address: 1,
                kind: Kind::Write,
                issue_cycle: 2,
                completion_cycle: 12,
            },
            MatchedRequest {
                request_id: 3,
                address: 0,
                kind: Kind::Read,
                issue_cycle: 1,
                completion_cycle: 4,
            },
        ];
        write_merged_dump(&matches, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "RequestID,Address,Read,Write,Cycle_in,Cycle_out,latency"
        );
        assert_eq!(lines.next().unwrap(), "3,0,1,0,1,4,3");
        assert_eq!(lines.next().unwrap(), "9,1,0,1,2,12,10");
    }

    proptest! {
        #[test]
        fn prop_latency_non_negative_when_completion_after_issue(
            pairs in prop::collection::vec((0u64..1000, 0u64..10_000, 0u64..5000), 1..64)
        ) {
            // Completion cycle is issue cycle plus a non-negative delay
            let issues: Vec<Event> = pairs
                .iter()
                .enumerate()
                .map(|(i, &(addr, cycle, _))| ev(i as u64, addr, Kind::Read, cycle))
                .collect();
            let completions: Vec<Event> = pairs
                .iter()
                .enumerate()
                .map(|(i, &(addr, cycle, delay))| ev(i as u64, addr, Kind::Read, cycle + delay))
                .collect();

            for m in match_by_id(&issues, &completions) {
                prop_assert!(m.latency() >= 0);
            }
            for m in match_positional(&issues, &completions) {
                prop_assert!(m.latency() >= 0);
            }
        }
    }
}
