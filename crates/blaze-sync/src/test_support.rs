//! Scripted and recording collaborators for exercising the sync core without a build tool or an
//! IDE.

use anyhow::{anyhow, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::collaborators::{
    BuildFailure, BuildOutputs, ConfirmationGate, DirectoryStructure, InteractiveThread,
    Preferences, ProjectModelSink, ReadinessGate, SyncScopeProvider, TargetScope,
};
use crate::coordinator::{FilterJob, SyncJob, SyncSubmitter};
use crate::handle::{Completion, SyncOutcome};
use crate::info::BlazeInfo;
use crate::{
    BlazeBuildParams, BlazeSyncParams, BuildInvoker, CancellationToken, SyncError,
    TargetExpression, TargetIdeInfo, TargetKey, TargetMap,
};

const BLOCKED_BUILD_LIMIT: Duration = Duration::from_secs(30);

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn target(expression: &str) -> TargetExpression {
    TargetExpression::from_string(expression).expect("valid target expression")
}

/// A map with one `java_library` entry per label.
pub fn target_map(labels: &[&str]) -> TargetMap {
    labels
        .iter()
        .map(|label| {
            (
                TargetKey::for_label(*label),
                TargetIdeInfo {
                    kind: "java_library".to_string(),
                    ..TargetIdeInfo::default()
                },
            )
        })
        .collect()
}

/// What the next `run_build` call does.
#[derive(Debug)]
pub enum ScriptedBuild {
    Succeed(TargetMap),
    Fail { message: String, partial: TargetMap },
    /// Block until cancelled, then fail.
    UntilCancelled,
}

/// A [`BuildInvoker`] that plays back queued results.
///
/// With nothing queued, a build succeeds with one entry per non-excluded target in its scope.
#[derive(Debug, Default)]
pub struct ScriptedBuildInvoker {
    builds: Mutex<VecDeque<ScriptedBuild>>,
    scopes: Mutex<Vec<TargetScope>>,
    info_failure: Mutex<Option<String>>,
    info_calls: AtomicUsize,
    held: Mutex<bool>,
    released: Condvar,
}

impl ScriptedBuildInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, build: ScriptedBuild) {
        self.builds.lock().push_back(build);
    }

    /// Make workspace-info queries fail until cleared with `None`.
    pub fn fail_workspace_info(&self, message: Option<&str>) {
        *self.info_failure.lock() = message.map(str::to_string);
    }

    /// Park every build at its start until [`ScriptedBuildInvoker::release`].
    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_all();
    }

    /// Scopes of every build started so far, in order.
    pub fn scopes(&self) -> Vec<TargetScope> {
        self.scopes.lock().clone()
    }

    pub fn build_count(&self) -> usize {
        self.scopes.lock().len()
    }

    pub fn info_count(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    fn wait_while_held(&self, cancellation: &CancellationToken) {
        let deadline = Instant::now() + BLOCKED_BUILD_LIMIT;
        let mut held = self.held.lock();
        while *held && !cancellation.is_cancelled() && Instant::now() < deadline {
            self.released
                .wait_for(&mut held, Duration::from_millis(5));
        }
    }
}

impl BuildInvoker for ScriptedBuildInvoker {
    fn run_build(
        &self,
        scope: &TargetScope,
        _build_params: &BlazeBuildParams,
        _workspace_root: &Path,
        cancellation: CancellationToken,
    ) -> std::result::Result<BuildOutputs, BuildFailure> {
        self.scopes.lock().push(scope.clone());
        self.wait_while_held(&cancellation);

        let scripted = self.builds.lock().pop_front();
        match scripted {
            Some(ScriptedBuild::Succeed(targets)) => Ok(BuildOutputs { targets }),
            Some(ScriptedBuild::Fail { message, partial }) => {
                Err(BuildFailure::new(message).with_partial(BuildOutputs { targets: partial }))
            }
            Some(ScriptedBuild::UntilCancelled) => {
                let deadline = Instant::now() + BLOCKED_BUILD_LIMIT;
                while !cancellation.is_cancelled() && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(BuildFailure::new("build interrupted"))
            }
            None => {
                let labels: Vec<&str> = scope
                    .targets
                    .iter()
                    .filter(|target| !target.is_excluded())
                    .map(TargetExpression::as_str)
                    .collect();
                Ok(BuildOutputs {
                    targets: target_map(&labels),
                })
            }
        }
    }

    fn query_workspace_info(
        &self,
        _build_params: &BlazeBuildParams,
        workspace_root: &Path,
    ) -> Result<DirectoryStructure> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.info_failure.lock().clone() {
            return Err(anyhow!(message));
        }
        let root = workspace_root.to_string_lossy().into_owned();
        Ok(DirectoryStructure {
            info: BlazeInfo::from_values([(
                crate::info::EXECUTION_ROOT_KEY.to_string(),
                format!("{root}/execroot"),
            )]),
            source_roots: [workspace_root.to_path_buf()].into_iter().collect(),
            excluded_roots: Default::default(),
        })
    }
}

/// Records everything applied to the project model.
#[derive(Debug, Default)]
pub struct RecordingModelSink {
    directories: Mutex<Vec<DirectoryStructure>>,
    target_maps: Mutex<Vec<TargetMap>>,
    fail_target_maps: Mutex<Option<String>>,
    panic_on_target_maps: AtomicBool,
}

impl RecordingModelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject target maps with `message` until cleared with `None`.
    pub fn fail_target_maps(&self, message: Option<&str>) {
        *self.fail_target_maps.lock() = message.map(str::to_string);
    }

    /// Panic on every target map until switched off.
    pub fn panic_on_target_maps(&self, panic: bool) {
        self.panic_on_target_maps.store(panic, Ordering::SeqCst);
    }

    pub fn directory_updates(&self) -> usize {
        self.directories.lock().len()
    }

    pub fn target_maps(&self) -> Vec<TargetMap> {
        self.target_maps.lock().clone()
    }

    pub fn last_target_map(&self) -> Option<TargetMap> {
        self.target_maps.lock().last().cloned()
    }
}

impl ProjectModelSink for RecordingModelSink {
    fn apply_directory_structure(&self, directories: &DirectoryStructure) -> Result<()> {
        self.directories.lock().push(directories.clone());
        Ok(())
    }

    fn apply_target_map(&self, target_map: &TargetMap) -> Result<()> {
        if self.panic_on_target_maps.load(Ordering::SeqCst) {
            panic!("model sink exploded");
        }
        if let Some(message) = self.fail_target_maps.lock().clone() {
            return Err(anyhow!(message));
        }
        self.target_maps.lock().push(target_map.clone());
        Ok(())
    }
}

/// Answers every confirmation the same way and counts the prompts.
#[derive(Debug)]
pub struct StaticConfirmationGate {
    accept: bool,
    prompts: AtomicUsize,
}

impl StaticConfirmationGate {
    pub fn new(accept: bool) -> Self {
        Self {
            accept,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl ConfirmationGate for StaticConfirmationGate {
    fn confirm(&self, _message: &str) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.accept
    }
}

/// Runs jobs inline, or drops them while [`SkippingInteractiveThread::skip`] is on.
#[derive(Debug, Default)]
pub struct SkippingInteractiveThread {
    skipping: AtomicBool,
    skipped: AtomicUsize,
}

impl SkippingInteractiveThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(&self, skipping: bool) {
        self.skipping.store(skipping, Ordering::SeqCst);
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }
}

impl InteractiveThread for SkippingInteractiveThread {
    fn invoke_and_wait(&self, job: &mut (dyn FnMut() + Send)) {
        if self.skipping.load(Ordering::SeqCst) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return;
        }
        job();
    }
}

/// Holds readiness callbacks until [`DeferredReadiness::fire`].
#[derive(Default)]
pub struct DeferredReadiness {
    pending: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl std::fmt::Debug for DeferredReadiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredReadiness")
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl DeferredReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run every registered callback once, in registration order.
    pub fn fire(&self) {
        let callbacks = std::mem::take(&mut *self.pending.lock());
        for callback in callbacks {
            callback();
        }
    }
}

impl ReadinessGate for DeferredReadiness {
    fn run_when_project_ready(&self, callback: Box<dyn FnOnce() + Send>) {
        self.pending.lock().push(callback);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPreferences {
    pub expand_sync_to_working_set: bool,
}

impl Preferences for StaticPreferences {
    fn expand_sync_to_working_set(&self) -> bool {
        self.expand_sync_to_working_set
    }
}

/// Fixed project-view and working-set targets.
#[derive(Debug, Default)]
pub struct StaticScope {
    pub project_view: Vec<TargetExpression>,
    pub working_set: Vec<TargetExpression>,
    pub working_set_error: Option<String>,
}

impl SyncScopeProvider for StaticScope {
    fn project_view_targets(&self) -> Vec<TargetExpression> {
        self.project_view.clone()
    }

    fn working_set_targets(&self) -> Result<Vec<TargetExpression>> {
        match &self.working_set_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(self.working_set.clone()),
        }
    }
}

/// One job captured by [`RecordingSubmitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub params: BlazeSyncParams,
    pub then: Option<BlazeSyncParams>,
}

/// A [`SyncSubmitter`] that keeps jobs instead of running them.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    jobs: Mutex<Vec<SubmittedJob>>,
    completions: Mutex<Vec<Completion<SyncOutcome>>>,
    filters: Mutex<Vec<FilterJob>>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<SubmittedJob> {
        self.jobs.lock().clone()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.lock().len()
    }

    /// Resolve every outstanding sync handle with `outcome`.
    pub fn finish_all(&self, outcome: Result<SyncOutcome, SyncError>) {
        let completions = std::mem::take(&mut *self.completions.lock());
        for completion in completions {
            completion.finish(outcome.clone());
        }
    }

    /// Run recorded filters against `target_map`, resolving their handles.
    pub fn run_filters(&self, target_map: &mut TargetMap) {
        let filters = std::mem::take(&mut *self.filters.lock());
        for job in filters {
            let removed = target_map.retain(|key| (job.predicate)(key));
            job.completion.finish(Ok(removed));
        }
    }
}

impl SyncSubmitter for RecordingSubmitter {
    fn submit(&self, job: SyncJob) {
        self.jobs.lock().push(SubmittedJob {
            params: job.params,
            then: job.then,
        });
        self.completions.lock().push(job.completion);
    }

    fn submit_filter(&self, job: FilterJob) {
        self.filters.lock().push(job);
    }
}
