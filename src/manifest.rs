//! Experiment manifests ("breadcrumbs") and sweep configuration
//!
//! A manifest is a small structured index `{ "experiments": [paths] }`
//! written by whatever drove the simulator. The core consumes it to
//! discover experiment result directories and writes a new one to publish
//! derived results (e.g. after producing diffs); it never owns the
//! layout of the directories themselves.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MemlatError, Result};

/// Filename of the manifest within an experiment root
pub const MANIFEST_FILE: &str = "breadcrumb.json";

/// Index of experiment result directories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Paths of experiment result directories
    pub experiments: Vec<PathBuf>,
}

impl Manifest {
    /// Load a manifest from `root/breadcrumb.json`
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(MemlatError::MissingResource {
                what: "manifest",
                path,
            });
        }
        let file = File::open(&path).map_err(|e| MemlatError::io(&path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| MemlatError::Json {
            path,
            source: e,
        })
    }

    /// Write the manifest as `root/breadcrumb.json`
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| MemlatError::Json {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| MemlatError::io(&path, e))
    }

    /// Map experiment name (final path component) to its directory
    ///
    /// Entries that are not directories on disk are skipped and reported;
    /// a stale manifest must not abort the whole batch.
    #[must_use]
    pub fn by_name(&self) -> BTreeMap<String, PathBuf> {
        let mut map = BTreeMap::new();
        for path in &self.experiments {
            if !path.is_dir() {
                log::warn!("skipping non-directory in manifest: {}", path.display());
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                map.insert(name.to_string(), path.clone());
            }
        }
        map
    }
}

// ============================================================================
// Sweep configuration
// ============================================================================

/// One point of a queue-size parameter sweep
///
/// The queue size is threaded explicitly into everything that needs it,
/// and the per-iteration output directory name is derived from the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Request queue size under test
    pub queue_size: u32,
}

impl SweepConfig {
    /// Directory name for this sweep point
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("hardware_config_{}", self.queue_size)
    }

    /// Experiment directory under the sweep root
    #[must_use]
    pub fn experiment_dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    /// The `meta/` subdirectory holding the per-run CSV logs
    #[must_use]
    pub fn meta_dir(&self, root: &Path) -> PathBuf {
        self.experiment_dir(root).join("meta")
    }

    /// Recover the queue size from a sweep directory name, for ordering
    /// experiments when reading a sweep back
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let queue_size = name
            .strip_prefix("hardware_config_")?
            .parse::<u32>()
            .ok()?;
        Some(Self { queue_size })
    }
}
