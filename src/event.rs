//! Event log parsing (EventStore)
//!
//! Parses the simulator's tabular issue/completion logs into typed events.
//! Columns are `RequestID, Address, Read, Write, Cycle` where exactly one
//! of `Read`/`Write` is 1. Parsing is deliberately lenient: a row with a
//! missing or non-numeric `Cycle` or `RequestID`, or an ambiguous kind
//! flag, is dropped and counted, never surfaced as an error. The drop
//! policy is an explicit filter so tests can assert on both the surviving
//! events and the rejected count.
//!
//! No ordering guarantee on output; consumers sort as needed.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MemlatError, Result};

/// Request kind recorded with every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Read request
    Read,
    /// Write request
    Write,
}

impl Kind {
    /// Lowercase label used in artifact filenames and JSON keys
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Kind::Read => "read",
            Kind::Write => "write",
        }
    }
}

/// One issue or completion event, immutable once parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Identifier correlating issue and completion within one simulator's log
    pub request_id: u64,
    /// Memory address of the access
    pub address: u64,
    /// Read or write
    pub kind: Kind,
    /// Simulated cycle the event was recorded at
    pub cycle: u64,
}

/// Outcome of the lenient parse: the valid subset plus the rejected count
#[derive(Debug, Clone, Default)]
pub struct ParsedEvents {
    /// Rows that survived validation
    pub events: Vec<Event>,
    /// Rows dropped for missing or non-numeric fields
    pub rejected: usize,
}

/// Raw CSV row before validation
///
/// All fields are read as strings so that a single bad cell rejects the
/// row instead of aborting the reader.
#[derive(Debug, Deserialize)]
struct RawEventRow {
    #[serde(rename = "RequestID")]
    request_id: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "Read")]
    read: String,
    #[serde(rename = "Write")]
    write: String,
    #[serde(rename = "Cycle")]
    cycle: String,
}

impl RawEventRow {
    /// Validate the row, returning `None` when it must be dropped
    fn validate(&self) -> Option<Event> {
        let request_id = parse_integer(&self.request_id)?;
        let cycle = parse_integer(&self.cycle)?;
        // Address is best-effort: a bad address still identifies the row,
        // but the kind flags must be unambiguous.
        let address = parse_integer(&self.address)?;
        let read = parse_integer(&self.read)?;
        let write = parse_integer(&self.write)?;
        let kind = match (read, write) {
            (1, 0) => Kind::Read,
            (0, 1) => Kind::Write,
            _ => return None,
        };
        Some(Event {
            request_id,
            address,
            kind,
            cycle,
        })
    }
}

/// Parse a non-negative integer, tolerating surrounding whitespace and a
/// `0x` hex prefix (addresses appear in either base depending on the
/// instrumentation that produced the log)
fn parse_integer(field: &str) -> Option<u64> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    trimmed.parse::<u64>().ok()
}

/// Parse an event log from any reader
///
/// Malformed rows are dropped and counted. A reader-level error mid-file
/// also counts the affected row as rejected rather than failing the parse.
pub fn parse_events<R: Read>(reader: R) -> ParsedEvents {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut parsed = ParsedEvents::default();
    for record in rdr.deserialize::<RawEventRow>() {
        match record {
            Ok(raw) => match raw.validate() {
                Some(event) => parsed.events.push(event),
                None => parsed.rejected += 1,
            },
            Err(_) => parsed.rejected += 1,
        }
    }
    parsed
}

/// Read an event log from disk
///
/// A missing file is a resource-level error that aborts the enclosing
/// unit of work; malformed rows inside an existing file are not.
pub fn read_event_log(path: &Path) -> Result<ParsedEvents> {
    if !path.exists() {
        return Err(MemlatError::MissingResource {
            what: "event log",
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| MemlatError::io(path, e))?;
    let parsed = parse_events(BufReader::new(file));
    if parsed.rejected > 0 {
        log::warn!(
            "dropped {} malformed row(s) while parsing {}",
            parsed.rejected,
            path.display()
        );
    }
    Ok(parsed)
}

/// Write events back out in the simulator's log format
///
/// Used to publish surrogate logs reconstructed from baseline histograms
/// so that every downstream consumer sees one uniform format.
pub fn write_event_log(events: &[Event], path: &Path) -> Result<()> {
    let csv_err = |e| MemlatError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["RequestID", "Address", "Read", "Write", "Cycle"])
        .map_err(csv_err)?;
    for e in events {
        wtr.write_record([
            e.request_id.to_string(),
            e.address.to_string(),
            u8::from(e.kind == Kind::Read).to_string(),
            u8::from(e.kind == Kind::Write).to_string(),
            e.cycle.to_string(),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| MemlatError::io(path, e))?;
    Ok(())
}

/// Locate the run's raw trace file (`*_trace.txt`) in an experiment
/// directory and count its lines
///
/// The count is the denominator of the utilization rate: what fraction of
/// issued traffic was successfully completed and measured. Returns `None`
/// when no trace file is present; utilization is then simply omitted.
pub fn count_trace_lines(dir: &Path) -> Result<Option<usize>> {
    let entries = std::fs::read_dir(dir).map_err(|e| MemlatError::io(dir, e))?;
    let mut trace_path: Option<PathBuf> = None;
    for entry in entries {
        let entry = entry.map_err(|e| MemlatError::io(dir, e))?;
        let path = entry.path();
        let is_trace = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_trace.txt"));
        if is_trace {
            trace_path = Some(path);
            break;
        }
    }
    let Some(path) = trace_path else {
        return Ok(None);
    };
    let file = File::open(&path).map_err(|e| MemlatError::io(&path, e))?;
    let count = BufReader::new(file).lines().count();
    Ok(Some(count))
}
