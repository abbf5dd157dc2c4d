//! JSON snapshots of the whole store.
//!
//! A snapshot is a flat list of [`CascadeRecord`]s. It is written to a
//! temporary sibling file and renamed over the target, so a crash mid-write
//! leaves the previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cascade::CascadeRecord;
use crate::error::{CascadeError, ErrorCode, ErrorContext, Result};
use crate::telemetry::OperationTimer;

/// Format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time copy of every cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    pub cascades: Vec<CascadeRecord>,
}

impl StoreSnapshot {
    pub fn new(cascades: Vec<CascadeRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            cascades,
        }
    }

    pub fn node_count(&self) -> usize {
        self.cascades.iter().map(|c| c.nodes.len()).sum()
    }
}

/// A snapshot location on disk.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `snapshot` atomically.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let timer = OperationTimer::start("cascade_snapshot_duration_seconds");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(snapshot)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let elapsed = timer.finish();
        info!(
            path = %self.path.display(),
            cascades = snapshot.cascades.len(),
            nodes = snapshot.node_count(),
            bytes = bytes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Snapshot written"
        );
        Ok(())
    }

    /// Read the snapshot, `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot to load");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: StoreSnapshot =
            serde_json::from_slice(&bytes).with_error_code(ErrorCode::SnapshotCorrupted)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CascadeError::snapshot_corrupted(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        Ok(Some(snapshot))
    }
}
