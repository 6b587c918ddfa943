//! Interfaces to the world outside the sync core.
//!
//! The build tool, the IDE's project model, its interactive thread and the user's project view
//! are all reached through the traits in this module. Implementations live in the host.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::info::BlazeInfo;
use crate::{BlazeBuildParams, CancellationToken, TargetExpression, TargetMap};

/// Directory/content-root layout reported by the build tool's workspace-info query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryStructure {
    pub info: BlazeInfo,
    #[serde(default)]
    pub source_roots: BTreeSet<PathBuf>,
    #[serde(default)]
    pub excluded_roots: BTreeSet<PathBuf>,
}

/// The concrete set of target patterns a build runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetScope {
    pub targets: BTreeSet<TargetExpression>,
}

impl TargetScope {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn as_args(&self) -> Vec<&str> {
        self.targets.iter().map(TargetExpression::as_str).collect()
    }
}

impl FromIterator<TargetExpression> for TargetScope {
    fn from_iter<I: IntoIterator<Item = TargetExpression>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().collect(),
        }
    }
}

/// Target data produced by one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutputs {
    pub targets: TargetMap,
}

/// A build that did not finish cleanly. `partial` holds whatever the build produced before it
/// stopped; the coordinator never merges it.
#[derive(Debug)]
pub struct BuildFailure {
    pub message: String,
    pub partial: BuildOutputs,
}

impl BuildFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: BuildOutputs::default(),
        }
    }

    pub fn with_partial(mut self, partial: BuildOutputs) -> Self {
        self.partial = partial;
        self
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BuildFailure {}

pub trait BuildInvoker: Send + Sync + fmt::Debug {
    /// Build `scope` and return the target data for it.
    ///
    /// Implementations should poll `cancellation` and stop early when it fires.
    fn run_build(
        &self,
        scope: &TargetScope,
        build_params: &BlazeBuildParams,
        workspace_root: &Path,
        cancellation: CancellationToken,
    ) -> std::result::Result<BuildOutputs, BuildFailure>;

    /// Query workspace layout without building anything.
    fn query_workspace_info(
        &self,
        build_params: &BlazeBuildParams,
        workspace_root: &Path,
    ) -> Result<DirectoryStructure>;
}

/// The IDE-side consumer of sync results. Called on the interactive thread only.
pub trait ProjectModelSink: Send + Sync + fmt::Debug {
    fn apply_directory_structure(&self, directories: &DirectoryStructure) -> Result<()>;

    fn apply_target_map(&self, target_map: &TargetMap) -> Result<()>;
}

pub trait ConfirmationGate: Send + Sync + fmt::Debug {
    /// Ask the user to confirm; `false` means declined.
    fn confirm(&self, message: &str) -> bool;
}

/// Defers work until the host project has finished initializing.
pub trait ReadinessGate: Send + Sync + fmt::Debug {
    /// Run `callback` once the project is ready. Fires exactly once per registration; may fire
    /// inline when the project is already initialized.
    fn run_when_project_ready(&self, callback: Box<dyn FnOnce() + Send>);
}

pub trait Preferences: Send + Sync + fmt::Debug {
    fn expand_sync_to_working_set(&self) -> bool;
}

/// Access to the IDE's interactive (UI) thread.
pub trait InteractiveThread: Send + Sync + fmt::Debug {
    /// Run `job` on the interactive thread and block until it has finished. Hosts may return
    /// without running `job`, for example while the UI is being torn down.
    fn invoke_and_wait(&self, job: &mut (dyn FnMut() + Send));
}

/// Resolves the implicit parts of a sync scope.
pub trait SyncScopeProvider: Send + Sync + fmt::Debug {
    /// Targets declared in the active project view.
    fn project_view_targets(&self) -> Vec<TargetExpression>;

    /// Targets touched by files with pending version-control changes.
    fn working_set_targets(&self) -> Result<Vec<TargetExpression>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediatelyReady;

impl ReadinessGate for ImmediatelyReady {
    fn run_when_project_ready(&self, callback: Box<dyn FnOnce() + Send>) {
        callback();
    }
}

/// Runs interactive jobs inline on whichever thread asks.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallingThread;

impl InteractiveThread for CallingThread {
    fn invoke_and_wait(&self, job: &mut (dyn FnMut() + Send)) {
        job();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl ConfirmationGate for AlwaysConfirm {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

/// A project without a project view or VCS integration.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyScope;

impl SyncScopeProvider for EmptyScope {
    fn project_view_targets(&self) -> Vec<TargetExpression> {
        Vec::new()
    }

    fn working_set_targets(&self) -> Result<Vec<TargetExpression>> {
        Ok(Vec::new())
    }
}

impl Preferences for blaze_config::SyncConfig {
    fn expand_sync_to_working_set(&self) -> bool {
        self.expand_sync_to_working_set
    }
}

/// Run `f` on the interactive thread and hand back its result, or `None` if the host skipped it.
pub(crate) fn on_interactive_thread<R, F>(thread: &dyn InteractiveThread, f: F) -> Option<R>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    let mut f = Some(f);
    let mut result = None;
    thread.invoke_and_wait(&mut || {
        if let Some(f) = f.take() {
            result = Some(f());
        }
    });
    result
}
