//! # Memlat
//!
//! Latency reconstruction and cross-simulator comparison for memory-system
//! event logs.
//!
//! Memlat rebuilds per-request latency from the asynchronous issue and
//! completion logs a simulator writes, aggregates those latencies into
//! distributions and time series, decomposes them into queueing and
//! pipeline-stage components, and statistically compares equivalent runs
//! from two independent simulators.
//!
//! ## Example
//!
//! ```rust
//! use memlat::event::{parse_events, Kind};
//! use memlat::matcher::{kind_latencies, match_by_id};
//!
//! let issues = parse_events(
//!     "RequestID, Address, Read, Write, Cycle\n1, 0, 1, 0, 10\n".as_bytes(),
//! );
//! let completions = parse_events(
//!     "RequestID, Address, Read, Write, Cycle\n1, 0, 1, 0, 25\n".as_bytes(),
//! );
//!
//! let matches = match_by_id(&issues.events, &completions.events);
//! assert_eq!(kind_latencies(&matches, Kind::Read), vec![15.0]);
//! ```
//!
//! ## Pipeline
//!
//! Event logs flow through the crate in one direction:
//! event store -> request matcher -> aggregator -> stage breakdown or
//! cross-run differ. Every entity is a derived view over the on-disk logs
//! of one completed run; re-running an analysis is idempotent apart from
//! rewriting its output artifacts.
//!
//! ## Approximations, by design
//!
//! Two alignments in this crate are best-effort and documented as such
//! rather than silently "fixed": the positional join for simulators that
//! only emit latency histograms, and the cross-run diff's positional
//! alignment of independently sorted samples. Neither guarantees that a
//! paired row is the same logical request on both sides.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_wrap)] // u64 -> i64 cycle arithmetic is intentional
#![allow(clippy::cast_precision_loss)] // u64 -> f64 for statistics is acceptable
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)] // Prefer explicit format args
#![allow(clippy::float_cmp)] // Exact float comparisons in tests

/// Latency aggregation: distributions, time-binned series, derived rates
pub mod aggregate;
/// Pipeline-stage latency decomposition from per-bank queue logs
pub mod breakdown;
/// CLI command implementations (extracted for testability)
pub mod cli;
/// Cross-run comparison of current vs baseline simulator output
pub mod diff;
pub mod error;
/// Event log parsing with an explicit lenient-drop policy
pub mod event;
/// Experiment manifests and sweep configuration
pub mod manifest;
/// Issue/completion matching: identifier join and positional join
pub mod matcher;
/// Scalar statistics shared by the aggregator and the differ
pub mod stats;

// Re-exports for convenience
pub use error::{MemlatError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
