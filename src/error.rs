//! Error types for the analysis pipeline
//!
//! Row-level problems (malformed rows, unmatched requests) are recovered
//! locally and never appear here; only resource-level failures that abort
//! the enclosing unit of work are surfaced as errors.

use std::path::PathBuf;

use thiserror::Error;

/// Resource-level analysis errors with enough context for per-unit reporting
#[derive(Debug, Error)]
pub enum MemlatError {
    /// A required log, manifest, or statistics file is absent
    #[error("missing {what} at {path}")]
    MissingResource {
        /// Human-readable description of the expected resource
        what: &'static str,
        /// Path that was checked
        path: PathBuf,
    },

    /// An I/O operation on a specific path failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or serialized
    #[error("malformed JSON in {path}: {source}")]
    Json {
        /// Path of the offending document
        path: PathBuf,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// A CSV file could not be read or written
    #[error("CSV error on {path}: {source}")]
    Csv {
        /// Path of the offending file
        path: PathBuf,
        /// Underlying csv error
        #[source]
        source: csv::Error,
    },

    /// Two manifests share no experiment names, so there is nothing to compare
    #[error("no matching experiments between {current} and {baseline}")]
    NoCommonExperiments {
        /// Manifest of the current simulator
        current: PathBuf,
        /// Manifest of the baseline simulator
        baseline: PathBuf,
    },
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, MemlatError>;

impl MemlatError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_resource_display() {
        let err = MemlatError::MissingResource {
            what: "issue log",
            path: PathBuf::from("/tmp/exp/input_request_stats.csv"),
        };
        let msg = err.to_string();
        assert!(msg.contains("issue log"));
        assert!(msg.contains("input_request_stats.csv"));
    }

    #[test]
    fn test_io_helper_preserves_path() {
        let err = MemlatError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/x"));
    }
}
