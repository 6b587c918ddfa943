//! Entry point for sync requests.
//!
//! The manager turns user intents ("full sync", "sync working set", ...) into
//! [`BlazeSyncParams`], asks for confirmation where a sync would skip the build, waits for the
//! project to be ready and hands the request to the coordinator.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::collaborators::on_interactive_thread;
use crate::coordinator::{FilterJob, SyncJob, SyncSubmitter};
use crate::handle::{FilterHandle, SyncHandle};
use crate::project::ProjectContext;
use crate::{BlazeSyncParams, SyncError, SyncMode, TargetExpression, TargetKey};

pub const FULL_SYNC_TITLE: &str = "Full Sync";
pub const INCREMENTAL_SYNC_TITLE: &str = "Sync";
pub const PARTIAL_SYNC_TITLE: &str = "Partial Sync";
pub const WORKING_SET_SYNC_TITLE: &str = "Sync Working Set";
pub const DIRECTORY_UPDATE_TITLE: &str = "Update Directories";
pub const INITIAL_DIRECTORY_UPDATE_TITLE: &str = "Initial directory update";

const NO_BUILD_WARNING: &str = "Syncing without a build will not pick up new or changed targets; \
code in modified files may not resolve until the next full sync. Continue?";

/// Whether a request should be preceded by a directory-only pre-pass.
///
/// Full syncs always get one so the project structure is usable while the build runs; partial and
/// incremental syncs only when they run in the foreground.
pub fn run_initial_directory_only_sync(sync_mode: SyncMode, background_sync: bool) -> bool {
    match sync_mode {
        SyncMode::NoBuild | SyncMode::Startup => false,
        SyncMode::Full => true,
        SyncMode::Incremental | SyncMode::Partial => !background_sync,
    }
}

#[derive(Debug, Clone)]
pub struct BlazeSyncManager {
    context: Arc<ProjectContext>,
    submitter: Arc<dyn SyncSubmitter>,
}

impl BlazeSyncManager {
    pub fn new(context: Arc<ProjectContext>, submitter: Arc<dyn SyncSubmitter>) -> Self {
        Self { context, submitter }
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    /// Submit `params` to the coordinator once the project is ready.
    ///
    /// Returns `Ok(None)` when the user declined a foreground no-build sync, and
    /// `Err(SyncError::Configuration)` when the project is not managed by the build tool and the
    /// readiness gate ran inline. A check that runs later reports the same error through the
    /// handle.
    pub fn request_sync(
        &self,
        params: BlazeSyncParams,
    ) -> Result<Option<SyncHandle>, SyncError> {
        if params.sync_mode() == SyncMode::NoBuild
            && !params.background_sync()
            && !self.confirm_no_build()
        {
            tracing::info!(
                target: "blaze.sync",
                request = %params,
                "sync declined by user"
            );
            return Ok(None);
        }

        let (completion, handle) = SyncHandle::channel();
        let rejected: Arc<Mutex<Option<SyncError>>> = Arc::new(Mutex::new(None));

        let context = self.context.clone();
        let submitter = self.submitter.clone();
        let rejected_for_callback = rejected.clone();
        self.context
            .readiness
            .run_when_project_ready(Box::new(move || {
                if !context.is_managed() {
                    let err = SyncError::Configuration {
                        build_system: context.build_system().to_string(),
                    };
                    tracing::error!(
                        target: "blaze.sync",
                        request = %params,
                        error = %err,
                        "refusing to sync unmanaged project"
                    );
                    *rejected_for_callback.lock() = Some(err.clone());
                    completion.finish(Err(err));
                    return;
                }

                let job = if run_initial_directory_only_sync(
                    params.sync_mode(),
                    params.background_sync(),
                ) {
                    let pre_pass = BlazeSyncParams::builder(
                        INITIAL_DIRECTORY_UPDATE_TITLE,
                        SyncMode::NoBuild,
                        context.build_params(),
                    )
                    .background_sync(true)
                    .build();
                    SyncJob::new(pre_pass, completion).followed_by(params)
                } else {
                    SyncJob::new(params, completion)
                };
                submitter.submit(job);
            }));

        let rejected = rejected.lock().take();
        match rejected {
            Some(err) => Err(err),
            None => Ok(Some(handle)),
        }
    }

    pub fn full_sync(&self) -> Result<Option<SyncHandle>, SyncError> {
        let params = BlazeSyncParams::builder(
            FULL_SYNC_TITLE,
            SyncMode::Full,
            self.context.build_params(),
        )
        .add_project_view_targets(true)
        .add_working_set(self.context.preferences.expand_sync_to_working_set())
        .build();
        self.request_sync(params)
    }

    pub fn incremental_sync(&self) -> Result<Option<SyncHandle>, SyncError> {
        let params = BlazeSyncParams::builder(
            INCREMENTAL_SYNC_TITLE,
            SyncMode::Incremental,
            self.context.build_params(),
        )
        .add_project_view_targets(true)
        .add_working_set(self.context.preferences.expand_sync_to_working_set())
        .build();
        self.request_sync(params)
    }

    pub fn partial_sync(
        &self,
        targets: impl IntoIterator<Item = TargetExpression>,
    ) -> Result<Option<SyncHandle>, SyncError> {
        let params = BlazeSyncParams::builder(
            PARTIAL_SYNC_TITLE,
            SyncMode::Partial,
            self.context.build_params(),
        )
        .add_target_expressions(targets)
        .build();
        self.request_sync(params)
    }

    pub fn working_set_sync(&self) -> Result<Option<SyncHandle>, SyncError> {
        let params = BlazeSyncParams::builder(
            WORKING_SET_SYNC_TITLE,
            SyncMode::Partial,
            self.context.build_params(),
        )
        .add_working_set(true)
        .build();
        self.request_sync(params)
    }

    /// Refresh source roots without building. Foreground updates ask for confirmation first.
    pub fn directory_update(&self, background: bool) -> Result<Option<SyncHandle>, SyncError> {
        let params = BlazeSyncParams::builder(
            DIRECTORY_UPDATE_TITLE,
            SyncMode::NoBuild,
            self.context.build_params(),
        )
        .background_sync(background)
        .build();
        self.request_sync(params)
    }

    /// Restore the last persisted target map after the project is reopened.
    pub fn startup_sync(&self) -> Result<Option<SyncHandle>, SyncError> {
        let params = BlazeSyncParams::builder(
            INCREMENTAL_SYNC_TITLE,
            SyncMode::Startup,
            self.context.build_params(),
        )
        .background_sync(true)
        .add_project_view_targets(true)
        .build();
        self.request_sync(params)
    }

    /// Drop every retained target for which `predicate` returns `false`. Never builds.
    pub fn filter_project_targets<P>(&self, predicate: P) -> FilterHandle
    where
        P: Fn(&TargetKey) -> bool + Send + 'static,
    {
        let (completion, handle) = FilterHandle::channel();
        let submitter = self.submitter.clone();
        self.context
            .readiness
            .run_when_project_ready(Box::new(move || {
                submitter.submit_filter(FilterJob {
                    predicate: Box::new(predicate),
                    completion,
                });
            }));
        handle
    }

    fn confirm_no_build(&self) -> bool {
        let confirmation = self.context.confirmation.as_ref();
        let confirmed = on_interactive_thread(self.context.interactive.as_ref(), || {
            confirmation.confirm(NO_BUILD_WARNING)
        });
        if confirmed.is_none() {
            tracing::warn!(
                target: "blaze.sync",
                "interactive thread skipped the no-build confirmation; treating it as declined"
            );
        }
        confirmed.unwrap_or(false)
    }
}
