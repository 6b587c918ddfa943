use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;

use crate::SyncMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResult {
    Succeeded,
    Failed,
    Cancelled,
}

impl SyncResult {
    pub fn is_success(self) -> bool {
        self == SyncResult::Succeeded
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncResult::Succeeded => "succeeded",
            SyncResult::Failed => "failed",
            SyncResult::Cancelled => "cancelled",
        })
    }
}

/// One completed sync sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub title: String,
    pub sync_mode: SyncMode,
    pub started_at: SystemTime,
    pub duration: Duration,
    pub result: SyncResult,
}

/// Append-only, project-scoped record of completed syncs.
#[derive(Debug)]
pub struct SyncStatsLog {
    records: Mutex<Vec<SyncStats>>,
    tx: broadcast::Sender<SyncStats>,
}

impl SyncStatsLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            records: Mutex::new(Vec::new()),
            tx,
        }
    }

    pub fn append(&self, stats: SyncStats) {
        tracing::info!(
            target: "blaze.sync",
            title = %stats.title,
            sync_mode = %stats.sync_mode,
            result = %stats.result,
            duration_ms = stats.duration.as_millis() as u64,
            "sync finished"
        );
        self.records.lock().push(stats.clone());
        // No subscribers is fine; the records vector is the source of truth.
        let _ = self.tx.send(stats);
    }

    pub fn records(&self) -> Vec<SyncStats> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Receive every record appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStats> {
        self.tx.subscribe()
    }
}

impl Default for SyncStatsLog {
    fn default() -> Self {
        Self::new()
    }
}
