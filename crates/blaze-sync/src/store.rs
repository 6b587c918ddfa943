//! On-disk copy of the reconciled target map, used by `startup` syncs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::TargetMap;

pub const SYNC_STATE_FILE_NAME: &str = "sync_state.json";

const SYNC_STATE_VERSION: u32 = 1;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write sync state {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize sync state: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSyncState {
    pub version: u32,
    pub target_map: TargetMap,
}

#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(project_data_directory: impl AsRef<Path>) -> Self {
        Self {
            path: project_data_directory.as_ref().join(SYNC_STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. Missing, unreadable, corrupt or outdated files all yield `None`;
    /// corrupt files are removed.
    pub fn load(&self) -> Option<PersistedSyncState> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "blaze.sync",
                        path = %self.path.display(),
                        error = %err,
                        "failed to read sync state; treating as absent"
                    );
                }
                return None;
            }
        };

        let state: PersistedSyncState = match serde_json::from_str(&data) {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(
                    target: "blaze.sync",
                    path = %self.path.display(),
                    error = %err,
                    "failed to parse sync state; deleting and treating as absent"
                );
                if let Err(remove_err) = fs::remove_file(&self.path) {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        tracing::debug!(
                            target: "blaze.sync",
                            path = %self.path.display(),
                            error = %remove_err,
                            "failed to remove invalid sync state file"
                        );
                    }
                }
                return None;
            }
        };

        if state.version != SYNC_STATE_VERSION {
            tracing::debug!(
                target: "blaze.sync",
                path = %self.path.display(),
                version = state.version,
                "ignoring sync state written by a different version"
            );
            return None;
        }
        Some(state)
    }

    /// Atomically replace the persisted state with `target_map`.
    pub fn save(&self, target_map: &TargetMap) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|source| StoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;

        let state = PersistedSyncState {
            version: SYNC_STATE_VERSION,
            target_map: target_map.clone(),
        };
        let data = serde_json::to_string_pretty(&state)?;

        let (tmp_path, mut file) =
            open_unique_tmp_file(&self.path, parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        let written = file
            .write_all(data.as_bytes())
            .and_then(|()| file.sync_all());
        drop(file);

        let result = written.and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(source) = result {
            if let Err(remove_err) = fs::remove_file(&tmp_path) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "blaze.sync",
                        path = %tmp_path.display(),
                        error = %remove_err,
                        "failed to remove temporary sync state file"
                    );
                }
            }
            return Err(StoreError::Write {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
