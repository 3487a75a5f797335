//! Per-transfer state tracked by the manager

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::engine::EngineHandle;

/// Lifecycle state of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Idle,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

/// Resumption state captured when a run is interrupted.
///
/// Serializable so callers can persist it across process restarts.
/// `offset` never exceeds the bytes actually flushed to the staging
/// file, and `validator` carries the resource identity token (ETag or
/// Last-Modified) used to detect a changed remote resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub offset: u64,
    pub validator: Option<String>,
    pub staging_path: PathBuf,
}

/// One in-progress or paused download
#[derive(Debug)]
pub struct TransferRecord {
    pub url: String,
    pub status: TransferStatus,
    /// Fraction in [0, 1]; `None` until the total size is known
    pub progress: Option<f64>,
    pub checkpoint: Option<Checkpoint>,
    /// Present only while a run is in flight
    pub handle: Option<EngineHandle>,
}

impl TransferRecord {
    pub fn new(url: String) -> Self {
        Self {
            url,
            status: TransferStatus::Idle,
            progress: None,
            checkpoint: None,
            handle: None,
        }
    }

    /// Update progress, keeping it monotonically non-decreasing within a run
    pub fn advance_progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        match self.progress {
            Some(current) if current > fraction => {}
            _ => self.progress = Some(fraction),
        }
    }

    /// Reset progress to what the checkpoint implies, for a fresh run
    pub fn reset_progress_for_resume(&mut self, total: Option<u64>) {
        self.progress = match (&self.checkpoint, total) {
            (Some(checkpoint), Some(total)) if total > 0 => {
                Some((checkpoint.offset as f64 / total as f64).clamp(0.0, 1.0))
            }
            // Known total, nothing on disk: the run starts at zero
            (None, Some(_)) => Some(0.0),
            _ => None,
        };
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            TransferStatus::Downloading | TransferStatus::Paused
        )
    }
}

/// Read-only view of a record, for UI polling
#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub url: String,
    pub status: TransferStatus,
    pub fraction: Option<f64>,
}

impl From<&TransferRecord> for TransferSnapshot {
    fn from(record: &TransferRecord) -> Self {
        Self {
            url: record.url.clone(),
            status: record.status,
            fraction: record.progress,
        }
    }
}
