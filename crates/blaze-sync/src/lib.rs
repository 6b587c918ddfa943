//! Project sync core for Bazel/Blaze workspaces.
//!
//! A sync reconciles the IDE's project model with the build tool's dependency graph. Callers go
//! through [`BlazeSyncManager`], which turns intents into [`BlazeSyncParams`], handles
//! confirmation and readiness, and submits work to the per-project [`SyncCoordinator`]. The
//! coordinator runs one sync at a time, merges queued requests, and keeps the reconciled
//! [`TargetMap`].
//!
//! Everything outside the core (the build tool, the IDE model, user prompts) is reached through
//! the traits in [`collaborators`].

pub mod collaborators;
pub mod command;
pub mod coordinator;
mod error;
mod handle;
pub mod info;
pub mod invoker;
pub mod manager;
mod mode;
mod params;
pub mod project;
mod stats;
pub mod store;
mod target;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use collaborators::{
    BuildFailure, BuildInvoker, BuildOutputs, ConfirmationGate, DirectoryStructure,
    InteractiveThread, Preferences, ProjectModelSink, ReadinessGate, SyncScopeProvider,
    TargetScope,
};
pub use coordinator::{
    CoordinatorServices, FilterJob, SyncCoordinator, SyncJob, SyncPhase, SyncStatusSnapshot,
    SyncSubmitter,
};
pub use error::{Result, SyncError};
pub use handle::{Completion, FilterHandle, SyncHandle, SyncOutcome, TaskHandle};
pub use info::BlazeInfo;
pub use invoker::CommandBuildInvoker;
pub use manager::{run_initial_directory_only_sync, BlazeSyncManager};
pub use mode::SyncMode;
pub use params::{BlazeBuildParams, BlazeSyncParams, BlazeSyncParamsBuilder};
pub use project::{BlazeProject, BuildSystem, ImportSettings, ProjectContext};
pub use stats::{SyncResult, SyncStats, SyncStatsLog};
pub use store::SyncStateStore;
pub use target::{TargetExpression, TargetIdeInfo, TargetKey, TargetMap};

pub use tokio_util::sync::CancellationToken;
