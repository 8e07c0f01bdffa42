//! End-to-end pipeline tests
//!
//! Exercises the full analysis flow over real temp directories: surrogate
//! reconstruction from a baseline histogram dump, per-run statistics,
//! stage breakdown, and the batch diff over two manifests.

use std::path::Path;

use memlat::aggregate::StatsRecord;
use memlat::breakdown::{compute_breakdown, StageType};
use memlat::cli;
use memlat::event::Kind;
use memlat::manifest::{Manifest, SweepConfig, MANIFEST_FILE};

/// Write a run whose read latencies, ordered by completion cycle, are
/// [10, 10, 10, 15, 15]
fn write_current_run(dir: &Path) {
    let mut issues = String::from("RequestID, Address, Read, Write, Cycle\n");
    let mut completions = String::from("RequestID, Address, Read, Write, Cycle\n");
    for (i, latency) in [(1u64, 10u64), (2, 10), (3, 10), (4, 15), (5, 15)] {
        issues.push_str(&format!("{i}, 64, 1, 0, {i}\n"));
        completions.push_str(&format!("{i}, 64, 1, 0, {}\n", i + latency));
    }
    std::fs::write(dir.join("input_request_stats.csv"), issues).unwrap();
    std::fs::write(dir.join("output_request_stats.csv"), completions).unwrap();
}

#[test]
fn stats_then_batch_diff_against_reconstructed_baseline() {
    let current_root = tempfile::tempdir().unwrap();
    let baseline_root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    // Current simulator wrote its logs directly
    let current_exp = current_root.path().join("exp_conv2d");
    std::fs::create_dir(&current_exp).unwrap();
    write_current_run(&current_exp);

    // Baseline only published a histogram dump; reconstruct its logs.
    // Buckets 5 (x3) and 10 (x2) give latencies [5, 5, 5, 10, 10].
    let histogram = baseline_root.path().join("dramsim3.json");
    std::fs::write(
        &histogram,
        r#"{"0": {"read_latency": {"5": 3, "10": 2}}}"#,
    )
    .unwrap();
    let baseline_exp = baseline_root.path().join("exp_conv2d");
    cli::run_convert_baseline(&histogram, &baseline_exp).unwrap();

    // Persist per-run statistics so the diff can attach rate differences
    cli::run_stats(&current_exp, 1000).unwrap();
    cli::run_stats(&baseline_exp, 1000).unwrap();

    let current_stats =
        StatsRecord::load(&StatsRecord::path_for(&current_exp, Kind::Read)).unwrap();
    assert_eq!(current_stats.kind_stats(Kind::Read).unwrap().average, 12.0);
    assert_eq!(current_stats.kind_stats(Kind::Read).unwrap().max, 15.0);
    let baseline_stats =
        StatsRecord::load(&StatsRecord::path_for(&baseline_exp, Kind::Read)).unwrap();
    assert_eq!(baseline_stats.kind_stats(Kind::Read).unwrap().average, 7.0);

    for (root, exp) in [
        (current_root.path(), &current_exp),
        (baseline_root.path(), &baseline_exp),
    ] {
        Manifest {
            experiments: vec![exp.clone()],
        }
        .save(root)
        .unwrap();
    }

    cli::run_diff_batch(current_root.path(), baseline_root.path(), out.path()).unwrap();

    // Both samples order to a constant +5 shift, so the spread is zero
    let diff_csv =
        std::fs::read_to_string(out.path().join("exp_conv2d/read_diff_stats.csv")).unwrap();
    let lines: Vec<&str> = diff_csv.lines().collect();
    assert_eq!(lines[0], "metric,value");
    assert_eq!(lines[1], "mean,5.0");
    assert_eq!(lines[2], "variance,0.0");
    assert_eq!(lines[3], "stddev,0.0");
    // Same request count and num_cycles on both sides
    assert_eq!(lines[4], "bandwidth_diff,0.0");

    // The batch republishes a manifest pointing at the diff directories
    let republished = Manifest::load(out.path()).unwrap();
    assert_eq!(republished.experiments.len(), 1);
    assert!(republished.experiments[0].ends_with("exp_conv2d"));
    assert!(out.path().join(MANIFEST_FILE).exists());
}

#[test]
fn sweep_layout_breakdown() {
    let root = tempfile::tempdir().unwrap();
    let config = SweepConfig { queue_size: 32 };
    let meta = config.meta_dir(root.path());
    std::fs::create_dir_all(&meta).unwrap();

    std::fs::write(
        meta.join("input_request_stats.csv"),
        "RequestID, Address, Read, Write, Cycle\n1, 0, 1, 0, 10\n",
    )
    .unwrap();
    std::fs::write(
        meta.join("bank_req_queue_stats_0.csv"),
        "RequestID, Type, Cycle\n1, ACTIVATE, 16\n1, READ, 20\n",
    )
    .unwrap();
    std::fs::write(
        meta.join("bank_resp_queue_stats_0.csv"),
        "RequestID, Cycle\n1, 24\n",
    )
    .unwrap();

    assert!(root
        .path()
        .join("hardware_config_32/meta/input_request_stats.csv")
        .exists());

    let breakdown = compute_breakdown(&meta).unwrap();
    assert_eq!(breakdown.queue, 6.0);
    assert_eq!(breakdown.stages[&StageType::Activate], 8.0);
    assert_eq!(breakdown.stages[&StageType::Read], 4.0);

    let shares = breakdown.shares().unwrap();
    let total: f64 = shares.iter().map(|(_, v)| v).sum();
    assert!((total - 100.0).abs() < 1e-9);
}

#[test]
fn binned_series_artifact_layout() {
    let run = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_current_run(run.path());

    let config = memlat::aggregate::BinningConfig {
        scale: 100,
        include_traffic: true,
    };
    cli::run_binned(run.path(), config, Some(out.path())).unwrap();

    // All five issues land in bin 0 at scale 100; mean latency is 12
    let latency = std::fs::read_to_string(out.path().join("binned_latency.csv")).unwrap();
    assert_eq!(
        latency.lines().collect::<Vec<_>>(),
        vec!["Cycle,AvgLatency", "0,12.0"]
    );
    let traffic = std::fs::read_to_string(out.path().join("traffic_counts.csv")).unwrap();
    assert_eq!(
        traffic.lines().collect::<Vec<_>>(),
        vec!["Cycle,Requests", "0,5"]
    );
}
