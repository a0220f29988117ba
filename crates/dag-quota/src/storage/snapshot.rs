//! Usage snapshot persistence: warm restart without a full DAG walk.
//!
//! File format:
//! ```json
//! {
//!     "version": 1,
//!     "usages": { "alice": 1500, "bob": 0 },
//!     "writers": {
//!         "wid_...": { "owner": "alice", "root": "...", "direct_retained": 1500, "owned_keys": [] }
//!     }
//! }
//! ```
//!
//! `usages` is the authoritative record. `writers` lets the next run diff
//! new roots against the last accounted ones instead of charging them again.
//! A warm restart needs both sections: a snapshot with only `usages` restores
//! the totals but leaves the forest empty, so the next registration sweep
//! charges every user's full DAG on top of the restored figure.
//!
//! `writers[w].retiring` lists owned keys dropped by `w`'s committed root
//! whose retraction was still running when the snapshot was taken. The next
//! event for `w` finishes that retraction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};
use crate::forest::StatView;
use crate::identity::WriterIdentity;

// ── File format constants ─────────────────────────────────────────────────────

const SNAPSHOT_FILE_VERSION: u32 = 1;

// ── On-disk structure ─────────────────────────────────────────────────────────

/// Confirmed usage per user and the writer stats it was derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub usages: BTreeMap<String, i64>,
    #[serde(default)]
    pub writers: BTreeMap<WriterIdentity, StatView>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    #[serde(flatten)]
    snapshot: UsageSnapshot,
}

// ── SnapshotStore ─────────────────────────────────────────────────────────────

/// Filesystem-backed snapshot at a single path.
///
/// Writes go to a sibling temp file first, so a crash mid-write leaves the
/// previous snapshot (or none) rather than a truncated one.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. Any failure maps to `SnapshotUnavailable`.
    pub fn load(&self) -> Result<UsageSnapshot> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            QuotaError::SnapshotUnavailable(format!("{}: {e}", self.path.display()))
        })?;

        let file: SnapshotFile = serde_json::from_slice(&bytes).map_err(|e| {
            QuotaError::SnapshotUnavailable(format!(
                "failed to parse snapshot {}: {e}",
                self.path.display()
            ))
        })?;

        if file.version != SNAPSHOT_FILE_VERSION {
            return Err(QuotaError::SnapshotUnavailable(format!(
                "unsupported snapshot version {} in {}",
                file.version,
                self.path.display()
            )));
        }

        Ok(file.snapshot)
    }

    /// Persist the snapshot, replacing any previous one.
    pub fn save(&self, snapshot: &UsageSnapshot) -> Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_FILE_VERSION,
            snapshot: snapshot.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| QuotaError::SerializationError(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Delete the snapshot file. Missing files are not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QuotaError::Io(e)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
