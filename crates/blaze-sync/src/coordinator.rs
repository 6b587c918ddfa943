//! Per-project sync coordinator.
//!
//! A single worker thread drains a FIFO of sync sequences and target filters. Requests that arrive
//! while an equivalent one is still queued are merged into it, so a burst of sync requests turns
//! into one sequence. Each sequence walks through a fixed set of phases:
//!
//! ```text
//! startup:   restore persisted map -> MODEL_UPDATE
//! no_build:  DIRECTORY_PASS -> MODEL_UPDATE
//! otherwise: DIRECTORY_PASS -> BUILD_DISPATCHED -> ARTIFACT_RECONCILE -> MODEL_UPDATE
//! ```
//!
//! The retained target map changes only on the worker thread, at the reconcile commit or inside a
//! filter. Everyone else gets `Arc` snapshots.

use parking_lot::Mutex as SnapshotMutex;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Instant, SystemTime};
use thiserror::Error;

use crate::collaborators::{
    on_interactive_thread, BuildOutputs, DirectoryStructure, InteractiveThread, TargetScope,
};
use crate::handle::{Completion, SyncOutcome};
use crate::store::SyncStateStore;
use crate::{
    BlazeSyncParams, BuildInvoker, CancellationToken, ProjectModelSink, SyncError, SyncMode,
    SyncResult, SyncScopeProvider, SyncStats, SyncStatsLog, TargetExpression, TargetKey,
    TargetMap,
};

/// A sync request on its way into the coordinator queue.
#[derive(Debug)]
pub struct SyncJob {
    pub params: BlazeSyncParams,
    /// Request to queue once `params` has run successfully. Used for the directory-only pre-pass.
    pub then: Option<BlazeSyncParams>,
    pub completion: Completion<SyncOutcome>,
}

impl SyncJob {
    pub fn new(params: BlazeSyncParams, completion: Completion<SyncOutcome>) -> Self {
        Self {
            params,
            then: None,
            completion,
        }
    }

    pub fn followed_by(mut self, then: BlazeSyncParams) -> Self {
        self.then = Some(then);
        self
    }
}

/// Keeps the entries for which it returns `true`.
pub type TargetPredicate = Box<dyn Fn(&TargetKey) -> bool + Send>;

/// A build-free narrowing of the retained target map.
pub struct FilterJob {
    pub predicate: TargetPredicate,
    pub completion: Completion<usize>,
}

impl fmt::Debug for FilterJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterJob").finish_non_exhaustive()
    }
}

/// Where the manager hands off work.
pub trait SyncSubmitter: Send + Sync + fmt::Debug {
    fn submit(&self, job: SyncJob);

    fn submit_filter(&self, job: FilterJob);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Idle,
    Queued,
    DirectoryPass,
    BuildDispatched,
    ArtifactReconcile,
    ModelUpdate,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Queued => "queued",
            SyncPhase::DirectoryPass => "directory_pass",
            SyncPhase::BuildDispatched => "build_dispatched",
            SyncPhase::ArtifactReconcile => "artifact_reconcile",
            SyncPhase::ModelUpdate => "model_update",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatusSnapshot {
    pub phase: SyncPhase,
    /// Title of the running sequence, or of the next queued one.
    pub active_title: Option<String>,
    pub active_mode: Option<SyncMode>,
    /// Queued tasks, not counting the running one.
    pub queued: usize,
    pub last_result: Option<SyncResult>,
    pub last_error: Option<String>,
}

/// Host services the worker talks to.
#[derive(Debug, Clone)]
pub struct CoordinatorServices {
    pub build_invoker: Arc<dyn BuildInvoker>,
    pub model_sink: Arc<dyn ProjectModelSink>,
    pub interactive: Arc<dyn InteractiveThread>,
    pub scope: Arc<dyn SyncScopeProvider>,
    pub stats: Arc<SyncStatsLog>,
}

#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
    _owner: Arc<Owner>,
}

#[derive(Debug)]
struct Inner {
    workspace_root: PathBuf,
    services: CoordinatorServices,
    store: Option<SyncStateStore>,
    state: Mutex<State>,
    wake: Condvar,
    target_map: SnapshotMutex<Arc<TargetMap>>,
}

/// Shuts the worker down once the last coordinator handle is gone. The worker thread only holds
/// `Inner`, so it does not keep this alive.
#[derive(Debug)]
struct Owner {
    inner: Arc<Inner>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<QueuedTask>,
    running: Option<RunningSync>,
    last: Option<CompletedSync>,
    shutdown: bool,
}

#[derive(Debug)]
enum QueuedTask {
    Sync(QueuedSync),
    Filter(FilterJob),
}

#[derive(Debug)]
struct QueuedSync {
    params: BlazeSyncParams,
    then: Option<BlazeSyncParams>,
    waiters: Vec<Completion<SyncOutcome>>,
    _queued_at: SystemTime,
}

#[derive(Debug)]
struct RunningSync {
    title: String,
    sync_mode: SyncMode,
    phase: SyncPhase,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
struct CompletedSync {
    result: SyncResult,
    message: Option<String>,
}

#[derive(Debug, Error)]
enum SequenceError {
    #[error("sync cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

impl SyncCoordinator {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        services: CoordinatorServices,
        store: Option<SyncStateStore>,
    ) -> Self {
        let inner = Arc::new(Inner {
            workspace_root: workspace_root.into(),
            services,
            store,
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            target_map: SnapshotMutex::new(Arc::new(TargetMap::new())),
        });

        let for_thread = inner.clone();
        std::thread::Builder::new()
            .name("blaze-sync-coordinator".to_string())
            .spawn(move || worker_loop(for_thread))
            .expect("failed to spawn blaze sync coordinator thread");

        Self {
            _owner: Arc::new(Owner {
                inner: inner.clone(),
            }),
            inner,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.inner.workspace_root
    }

    /// Cancel the running sequence. Queued work is left alone.
    pub fn cancel(&self) {
        let state = self.inner.lock_state();
        if let Some(running) = state.running.as_ref() {
            tracing::info!(
                target: "blaze.sync",
                title = %running.title,
                phase = %running.phase,
                "cancelling sync"
            );
            running.cancel.cancel();
        }
    }

    pub fn status(&self) -> SyncStatusSnapshot {
        let state = self.inner.lock_state();
        let (phase, active_title, active_mode) = if let Some(running) = state.running.as_ref() {
            (
                running.phase,
                Some(running.title.clone()),
                Some(running.sync_mode),
            )
        } else if let Some(next) = state.queue.iter().find_map(QueuedTask::as_sync) {
            (
                SyncPhase::Queued,
                Some(next.params.title().to_string()),
                Some(next.params.sync_mode()),
            )
        } else if !state.queue.is_empty() {
            (SyncPhase::Queued, None, None)
        } else {
            (SyncPhase::Idle, None, None)
        };

        SyncStatusSnapshot {
            phase,
            active_title,
            active_mode,
            queued: state.queue.len(),
            last_result: state.last.as_ref().map(|last| last.result),
            last_error: state.last.as_ref().and_then(|last| last.message.clone()),
        }
    }

    /// Immutable snapshot of the reconciled target map.
    pub fn retained_target_map(&self) -> Arc<TargetMap> {
        self.inner.retained_target_map()
    }

    /// Stop accepting work, cancel the running sequence and fail everything still queued.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl SyncSubmitter for SyncCoordinator {
    fn submit(&self, job: SyncJob) {
        let mut state = self.inner.lock_state();
        if state.shutdown {
            drop(state);
            job.completion.finish(Err(SyncError::CoordinatorShutdown));
            return;
        }
        let SyncJob {
            params,
            then,
            completion,
        } = job;
        enqueue_sync(&mut state, params, then, vec![completion]);
        self.inner.wake.notify_all();
    }

    fn submit_filter(&self, job: FilterJob) {
        let mut state = self.inner.lock_state();
        if state.shutdown {
            drop(state);
            job.completion.finish(Err(SyncError::CoordinatorShutdown));
            return;
        }
        state.queue.push_back(QueuedTask::Filter(job));
        self.inner.wake.notify_all();
    }
}

impl QueuedTask {
    fn as_sync(&self) -> Option<&QueuedSync> {
        match self {
            QueuedTask::Sync(queued) => Some(queued),
            QueuedTask::Filter(_) => None,
        }
    }
}

/// Append a sync to the queue, merging it into the tail entry when the tail is a sync that has not
/// started yet.
///
/// A pending continuation absorbs the other side's main request, so the directory pre-pass still
/// runs first. `Startup` never merges: it restores state without building, so folding a build
/// request into it would drop the build.
fn enqueue_sync(
    state: &mut State,
    params: BlazeSyncParams,
    then: Option<BlazeSyncParams>,
    waiters: Vec<Completion<SyncOutcome>>,
) {
    if let Some(QueuedTask::Sync(tail)) = state.queue.back_mut() {
        if tail.params.sync_mode() != SyncMode::Startup && params.sync_mode() != SyncMode::Startup {
            let (merged, merged_then) = match (tail.then.take(), then) {
                (None, None) => (BlazeSyncParams::combine(&tail.params, &params), None),
                (None, Some(then)) => (params, Some(BlazeSyncParams::combine(&tail.params, &then))),
                (Some(tail_then), None) => (
                    tail.params.clone(),
                    Some(BlazeSyncParams::combine(&tail_then, &params)),
                ),
                (Some(tail_then), Some(then)) => (
                    BlazeSyncParams::combine(&tail.params, &params),
                    Some(BlazeSyncParams::combine(&tail_then, &then)),
                ),
            };
            tracing::debug!(
                target: "blaze.sync",
                queued = %tail.params,
                merged = %merged,
                continuation = ?merged_then.as_ref().map(ToString::to_string),
                "merged sync request into queued request"
            );
            tail.params = merged;
            tail.then = merged_then;
            tail.waiters.extend(waiters);
            return;
        }
    }

    tracing::debug!(
        target: "blaze.sync",
        request = %params,
        has_continuation = then.is_some(),
        "queued sync request"
    );
    state.queue.push_back(QueuedTask::Sync(QueuedSync {
        params,
        then,
        waiters,
        _queued_at: SystemTime::now(),
    }));
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let (task, cancel) = {
            let mut state = inner.lock_state();
            while state.queue.is_empty() && !state.shutdown {
                state = inner
                    .wake
                    .wait(state)
                    .expect("blaze sync coordinator lock poisoned");
            }
            if state.shutdown {
                break;
            }
            let Some(task) = state.queue.pop_front() else {
                continue;
            };

            let cancel = CancellationToken::new();
            if let QueuedTask::Sync(queued) = &task {
                state.running = Some(RunningSync {
                    title: queued.params.title().to_string(),
                    sync_mode: queued.params.sync_mode(),
                    phase: SyncPhase::Queued,
                    cancel: cancel.clone(),
                });
            }
            (task, cancel)
        };

        match task {
            QueuedTask::Sync(queued) => inner.run_queued(queued, &cancel),
            QueuedTask::Filter(job) => {
                let removed = inner.apply_filter(&job.predicate);
                job.completion.finish(Ok(removed));
            }
        }
    }

    tracing::debug!(target: "blaze.sync", "sync coordinator worker stopped");
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .expect("blaze sync coordinator lock poisoned")
    }

    fn retained_target_map(&self) -> Arc<TargetMap> {
        self.target_map.lock().clone()
    }

    fn shutdown(&self) {
        let drained = {
            let mut state = self.lock_state();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            if let Some(running) = state.running.as_ref() {
                running.cancel.cancel();
            }
            std::mem::take(&mut state.queue)
        };
        self.wake.notify_all();

        tracing::debug!(
            target: "blaze.sync",
            dropped = drained.len(),
            "sync coordinator shutting down"
        );
        for task in drained {
            match task {
                QueuedTask::Sync(queued) => {
                    for waiter in queued.waiters {
                        waiter.finish(Err(SyncError::CoordinatorShutdown));
                    }
                }
                QueuedTask::Filter(job) => job.completion.finish(Err(SyncError::CoordinatorShutdown)),
            }
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut state = self.lock_state();
        if let Some(running) = state.running.as_mut() {
            tracing::debug!(
                target: "blaze.sync",
                title = %running.title,
                phase = %phase,
                "sync phase"
            );
            running.phase = phase;
        }
    }

    fn run_queued(&self, queued: QueuedSync, cancel: &CancellationToken) {
        let QueuedSync {
            params,
            then,
            waiters,
            ..
        } = queued;

        let outcome = self.run_sequence(&params, cancel);

        let mut state = self.lock_state();
        state.running = None;
        state.last = Some(CompletedSync {
            result: outcome.result,
            message: outcome.message.clone(),
        });

        match then.filter(|_| outcome.is_success()) {
            Some(next) if !state.shutdown => {
                tracing::info!(
                    target: "blaze.sync",
                    next = %next,
                    "directory pre-pass finished; queueing follow-up sync"
                );
                enqueue_sync(&mut state, next, None, waiters);
                self.wake.notify_all();
            }
            Some(_) => {
                drop(state);
                for waiter in waiters {
                    waiter.finish(Err(SyncError::CoordinatorShutdown));
                }
            }
            None => {
                drop(state);
                for waiter in waiters {
                    waiter.finish(Ok(outcome.clone()));
                }
            }
        }
    }

    fn run_sequence(&self, params: &BlazeSyncParams, cancel: &CancellationToken) -> SyncOutcome {
        let started_at = SystemTime::now();
        let start = Instant::now();
        tracing::info!(
            target: "blaze.sync",
            title = %params.title(),
            sync_mode = %params.sync_mode(),
            background = params.background_sync(),
            "sync started"
        );

        let executed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.execute(params, cancel)
        }))
        .unwrap_or_else(|panic| {
            let message = panic_message(&*panic);
            tracing::error!(
                target: "blaze.sync",
                title = %params.title(),
                panic = %message,
                "sync sequence panicked"
            );
            Err(SequenceError::Failed(format!("sync panicked: {message}")))
        });

        let (result, message) = match executed {
            Ok(()) => (SyncResult::Succeeded, None),
            Err(SequenceError::Cancelled) => (SyncResult::Cancelled, None),
            Err(SequenceError::Failed(message)) => {
                tracing::warn!(
                    target: "blaze.sync",
                    title = %params.title(),
                    error = %message,
                    "sync failed"
                );
                (SyncResult::Failed, Some(message))
            }
        };

        self.services.stats.append(SyncStats {
            title: params.title().to_string(),
            sync_mode: params.sync_mode(),
            started_at,
            duration: start.elapsed(),
            result,
        });

        SyncOutcome {
            title: params.title().to_string(),
            sync_mode: params.sync_mode(),
            result,
            message,
        }
    }

    fn execute(
        &self,
        params: &BlazeSyncParams,
        cancel: &CancellationToken,
    ) -> Result<(), SequenceError> {
        check_cancelled(cancel)?;
        match params.sync_mode() {
            SyncMode::Startup => self.restore_persisted_state(cancel),
            SyncMode::NoBuild => {
                let directories = self.directory_pass(params, cancel)?;
                self.set_phase(SyncPhase::ModelUpdate);
                self.update_model(Some(&directories), None)
            }
            SyncMode::Partial | SyncMode::Incremental | SyncMode::Full => {
                self.build_and_reconcile(params, cancel)
            }
        }
    }

    fn restore_persisted_state(&self, cancel: &CancellationToken) -> Result<(), SequenceError> {
        self.set_phase(SyncPhase::ModelUpdate);
        let Some(store) = self.store.as_ref() else {
            tracing::info!(
                target: "blaze.sync",
                "sync state persistence disabled; nothing to restore"
            );
            return Ok(());
        };
        let Some(persisted) = store.load() else {
            tracing::info!(
                target: "blaze.sync",
                path = %store.path().display(),
                "no persisted sync state to restore"
            );
            return Ok(());
        };

        check_cancelled(cancel)?;
        let restored = Arc::new(persisted.target_map);
        tracing::info!(
            target: "blaze.sync",
            targets = restored.len(),
            "restored persisted target map"
        );
        self.commit(restored.clone());
        self.update_model(None, Some(&restored))
    }

    fn directory_pass(
        &self,
        params: &BlazeSyncParams,
        cancel: &CancellationToken,
    ) -> Result<DirectoryStructure, SequenceError> {
        self.set_phase(SyncPhase::DirectoryPass);
        let directories = self
            .services
            .build_invoker
            .query_workspace_info(params.build_params(), &self.workspace_root)
            .map_err(|err| {
                failed_unless_cancelled(cancel, format!("failed to query workspace info: {err:#}"))
            })?;
        check_cancelled(cancel)?;
        Ok(directories)
    }

    fn build_and_reconcile(
        &self,
        params: &BlazeSyncParams,
        cancel: &CancellationToken,
    ) -> Result<(), SequenceError> {
        let directories = self.directory_pass(params, cancel)?;

        self.set_phase(SyncPhase::BuildDispatched);
        let scope = self.resolve_scope(params);
        let outputs = if scope.is_empty() {
            tracing::info!(
                target: "blaze.sync",
                title = %params.title(),
                "no targets in scope; skipping build"
            );
            BuildOutputs::default()
        } else {
            tracing::debug!(
                target: "blaze.sync",
                targets = %scope.as_args().join(" "),
                "dispatching build"
            );
            match self.services.build_invoker.run_build(
                &scope,
                params.build_params(),
                &self.workspace_root,
                cancel.clone(),
            ) {
                Ok(outputs) => outputs,
                Err(failure) => {
                    tracing::debug!(
                        target: "blaze.sync",
                        discarded = failure.partial.targets.len(),
                        "discarding partial build outputs"
                    );
                    return Err(failed_unless_cancelled(
                        cancel,
                        format!("build failed: {failure}"),
                    ));
                }
            }
        };
        check_cancelled(cancel)?;

        self.set_phase(SyncPhase::ArtifactReconcile);
        let reconciled = match params.sync_mode() {
            SyncMode::Full => outputs.targets,
            _ => {
                let mut merged = (*self.retained_target_map()).clone();
                merged.merge_from(outputs.targets);
                merged
            }
        };
        check_cancelled(cancel)?;
        let reconciled = Arc::new(reconciled);
        self.commit(reconciled.clone());

        self.set_phase(SyncPhase::ModelUpdate);
        self.update_model(Some(&directories), Some(&reconciled))
    }

    fn resolve_scope(&self, params: &BlazeSyncParams) -> TargetScope {
        let mut targets: BTreeSet<TargetExpression> = params.target_expressions().clone();
        if params.add_project_view_targets() {
            targets.extend(self.services.scope.project_view_targets());
        }
        if params.add_working_set() {
            match self.services.scope.working_set_targets() {
                Ok(working_set) => targets.extend(working_set),
                Err(err) => tracing::warn!(
                    target: "blaze.sync",
                    error = %format!("{err:#}"),
                    "failed to compute working set; syncing without it"
                ),
            }
        }
        TargetScope { targets }
    }

    /// Replace the retained map and persist it.
    fn commit(&self, target_map: Arc<TargetMap>) {
        *self.target_map.lock() = target_map.clone();
        self.persist(&target_map);
    }

    fn persist(&self, target_map: &TargetMap) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(err) = store.save(target_map) {
            tracing::warn!(
                target: "blaze.sync",
                path = %store.path().display(),
                error = %err,
                "failed to persist sync state"
            );
        }
    }

    fn update_model(
        &self,
        directories: Option<&DirectoryStructure>,
        target_map: Option<&TargetMap>,
    ) -> Result<(), SequenceError> {
        let sink = self.services.model_sink.as_ref();
        on_interactive_thread(self.services.interactive.as_ref(), || {
            if let Some(directories) = directories {
                sink.apply_directory_structure(directories)?;
            }
            if let Some(target_map) = target_map {
                sink.apply_target_map(target_map)?;
            }
            anyhow::Ok(())
        })
        .ok_or_else(|| {
            SequenceError::Failed(
                "project model update failed: interactive thread did not run the update"
                    .to_string(),
            )
        })?
        .map_err(|err| SequenceError::Failed(format!("project model update failed: {err:#}")))
    }

    fn apply_filter(&self, predicate: &TargetPredicate) -> usize {
        let mut narrowed = (*self.retained_target_map()).clone();
        let removed = narrowed.retain(|key| predicate(key));
        if removed == 0 {
            tracing::debug!(target: "blaze.sync", "target filter removed nothing");
            return 0;
        }

        let narrowed = Arc::new(narrowed);
        self.commit(narrowed.clone());
        tracing::info!(
            target: "blaze.sync",
            removed,
            remaining = narrowed.len(),
            "filtered project targets"
        );
        if let Err(err) = self.update_model(None, Some(&narrowed)) {
            tracing::warn!(
                target: "blaze.sync",
                error = %err,
                "failed to apply filtered target map"
            );
        }
        removed
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_else(|| "<non-string panic payload>".to_string())
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), SequenceError> {
    if cancel.is_cancelled() {
        Err(SequenceError::Cancelled)
    } else {
        Ok(())
    }
}

fn failed_unless_cancelled(cancel: &CancellationToken, message: String) -> SequenceError {
    if cancel.is_cancelled() {
        SequenceError::Cancelled
    } else {
        SequenceError::Failed(message)
    }
}
