use serde::{Deserialize, Serialize};
use std::fmt;

/// How much work a sync does.
///
/// Variants are declared in ascending priority; `Ord` is used to pick the stronger of two modes
/// when requests are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Updates directory/source roots only, without any build.
    NoBuild,
    /// Builds an explicit subset of targets.
    Partial,
    /// Rebuilds everything reachable from the project view, incrementally.
    Incremental,
    /// Discards previously synced state and recomputes it from scratch.
    Full,
    /// Restores previously persisted state when the project is opened.
    Startup,
}

impl SyncMode {
    pub const ALL: [SyncMode; 5] = [
        SyncMode::NoBuild,
        SyncMode::Partial,
        SyncMode::Incremental,
        SyncMode::Full,
        SyncMode::Startup,
    ];

    /// The stronger of two modes.
    pub fn stronger(self, other: SyncMode) -> SyncMode {
        self.max(other)
    }

    /// Whether a sequence in this mode invokes the build tool's build action.
    pub fn builds_targets(self) -> bool {
        matches!(
            self,
            SyncMode::Partial | SyncMode::Incremental | SyncMode::Full
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::NoBuild => "no_build",
            SyncMode::Partial => "partial",
            SyncMode::Incremental => "incremental",
            SyncMode::Full => "full",
            SyncMode::Startup => "startup",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
