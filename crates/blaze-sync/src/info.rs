//! `<binary> info` output.
//!
//! The directory pass needs to know where the build tool keeps its execution root and output
//! trees. `info` prints one `key: value` pair per line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::command::CommandRunner;
use crate::project::BuildSystem;
use crate::{BlazeBuildParams, CancellationToken};

pub const EXECUTION_ROOT_KEY: &str = "execution_root";
pub const OUTPUT_BASE_KEY: &str = "output_base";
pub const OUTPUT_PATH_KEY: &str = "output_path";
pub const PACKAGE_PATH_KEY: &str = "package_path";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlazeInfo {
    values: BTreeMap<String, String>,
}

impl BlazeInfo {
    pub fn parse(stdout: &str) -> Self {
        let values = stdout
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                if key.is_empty() || key.contains(char::is_whitespace) {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { values }
    }

    pub fn from_values(values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    pub fn execution_root(&self) -> Option<PathBuf> {
        self.path(EXECUTION_ROOT_KEY)
    }

    pub fn output_base(&self) -> Option<PathBuf> {
        self.path(OUTPUT_BASE_KEY)
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.path(OUTPUT_PATH_KEY)
    }

    pub fn bin_dir(&self, build_system: BuildSystem) -> Option<PathBuf> {
        self.path(&bin_key(build_system))
    }

    pub fn genfiles_dir(&self, build_system: BuildSystem) -> Option<PathBuf> {
        self.path(&genfiles_key(build_system))
    }

    pub fn testlogs_dir(&self, build_system: BuildSystem) -> Option<PathBuf> {
        self.path(&testlogs_key(build_system))
    }
}

pub fn bin_key(build_system: BuildSystem) -> String {
    format!("{}-bin", build_system.name())
}

pub fn genfiles_key(build_system: BuildSystem) -> String {
    format!("{}-genfiles", build_system.name())
}

pub fn testlogs_key(build_system: BuildSystem) -> String {
    format!("{}-testlogs", build_system.name())
}

/// Run `<binary> info <flags>` in `workspace_root`.
pub fn run_blaze_info(
    runner: &dyn CommandRunner,
    build_params: &BlazeBuildParams,
    workspace_root: &Path,
    cancellation: &CancellationToken,
) -> Result<BlazeInfo> {
    let mut args = vec!["info"];
    args.extend(build_params.build_flags.iter().map(String::as_str));
    let output = runner
        .run(workspace_root, &build_params.binary_path, &args, cancellation)
        .with_context(|| format!("`{} info` failed", build_params.binary_path))?;
    Ok(BlazeInfo::parse(&output.stdout))
}
