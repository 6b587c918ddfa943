//! Project-scoped wiring: import settings, host collaborators and the open/close lifecycle that
//! owns one coordinator and one manager per project.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blaze_config::BlazeConfig;

use crate::collaborators::{
    AlwaysConfirm, CallingThread, ConfirmationGate, EmptyScope, ImmediatelyReady,
    InteractiveThread, Preferences, ReadinessGate, SyncScopeProvider,
};
use crate::coordinator::{CoordinatorServices, SyncCoordinator};
use crate::invoker::CommandBuildInvoker;
use crate::manager::BlazeSyncManager;
use crate::store::SyncStateStore;
use crate::{BlazeBuildParams, BuildInvoker, ProjectModelSink, SyncStatsLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
    Bazel,
    Blaze,
}

impl BuildSystem {
    /// Lower-case name, as used in `info` keys such as `bazel-bin`.
    pub fn name(self) -> &'static str {
        match self {
            BuildSystem::Bazel => "bazel",
            BuildSystem::Blaze => "blaze",
        }
    }

    pub fn default_binary(self) -> &'static str {
        self.name()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BuildSystem::Bazel => "Bazel",
            BuildSystem::Blaze => "Blaze",
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Present exactly when the project was imported from a build-tool workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub project_name: String,
    pub workspace_root: PathBuf,
    pub build_system: BuildSystem,
    /// Where per-project caches (including persisted sync state) live.
    #[serde(default)]
    pub project_data_directory: Option<PathBuf>,
}

impl ImportSettings {
    pub fn new(
        project_name: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
        build_system: BuildSystem,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            workspace_root: workspace_root.into(),
            build_system,
            project_data_directory: None,
        }
    }

    pub fn with_project_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_data_directory = Some(dir.into());
        self
    }
}

/// Everything the manager needs to know about the host project.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub import_settings: Option<ImportSettings>,
    pub config: BlazeConfig,
    /// Build system named in errors for unmanaged projects.
    pub default_build_system: BuildSystem,
    pub confirmation: Arc<dyn ConfirmationGate>,
    pub readiness: Arc<dyn ReadinessGate>,
    pub preferences: Arc<dyn Preferences>,
    pub interactive: Arc<dyn InteractiveThread>,
    pub scope: Arc<dyn SyncScopeProvider>,
    pub stats: Arc<SyncStatsLog>,
}

impl ProjectContext {
    /// A context with inline collaborators: always ready, always confirmed, no project view and
    /// preferences taken from `config.sync`.
    pub fn new(import_settings: Option<ImportSettings>, config: BlazeConfig) -> Self {
        let preferences: Arc<dyn Preferences> = Arc::new(config.sync.clone());
        Self {
            import_settings,
            config,
            default_build_system: BuildSystem::Bazel,
            confirmation: Arc::new(AlwaysConfirm),
            readiness: Arc::new(ImmediatelyReady),
            preferences,
            interactive: Arc::new(CallingThread),
            scope: Arc::new(EmptyScope),
            stats: Arc::new(SyncStatsLog::new()),
        }
    }

    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationGate>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn with_readiness(mut self, readiness: Arc<dyn ReadinessGate>) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_interactive_thread(mut self, interactive: Arc<dyn InteractiveThread>) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_scope_provider(mut self, scope: Arc<dyn SyncScopeProvider>) -> Self {
        self.scope = scope;
        self
    }

    pub fn is_managed(&self) -> bool {
        self.import_settings.is_some()
    }

    pub fn build_system(&self) -> BuildSystem {
        self.import_settings
            .as_ref()
            .map_or(self.default_build_system, |settings| settings.build_system)
    }

    pub fn workspace_root(&self) -> Option<&Path> {
        self.import_settings
            .as_ref()
            .map(|settings| settings.workspace_root.as_path())
    }

    /// Build parameters for a new request against this project.
    pub fn build_params(&self) -> BlazeBuildParams {
        match &self.import_settings {
            Some(settings) => BlazeBuildParams::from_project(settings, &self.config.build),
            None => BlazeBuildParams::for_build_system(self.default_build_system),
        }
    }

    /// The sync-state store, when persistence is enabled and the project has a data directory.
    pub fn state_store(&self) -> Option<SyncStateStore> {
        if !self.config.sync.persist_sync_state {
            return None;
        }
        self.import_settings
            .as_ref()
            .and_then(|settings| settings.project_data_directory.as_deref())
            .map(SyncStateStore::new)
    }
}

/// An open project: one coordinator and one manager sharing a [`ProjectContext`].
#[derive(Debug)]
pub struct BlazeProject {
    context: Arc<ProjectContext>,
    coordinator: SyncCoordinator,
    manager: BlazeSyncManager,
}

impl BlazeProject {
    pub fn open(
        context: ProjectContext,
        build_invoker: Arc<dyn BuildInvoker>,
        model_sink: Arc<dyn ProjectModelSink>,
    ) -> Self {
        let context = Arc::new(context);
        let services = CoordinatorServices {
            build_invoker,
            model_sink,
            interactive: context.interactive.clone(),
            scope: context.scope.clone(),
            stats: context.stats.clone(),
        };
        let coordinator = SyncCoordinator::new(
            context.workspace_root().unwrap_or(Path::new("")),
            services,
            context.state_store(),
        );
        let manager = BlazeSyncManager::new(context.clone(), Arc::new(coordinator.clone()));

        tracing::info!(
            target: "blaze.sync",
            managed = context.is_managed(),
            build_system = %context.build_system(),
            "opened project"
        );
        Self {
            context,
            coordinator,
            manager,
        }
    }

    /// Open a project whose builds run the configured build-tool binary.
    pub fn open_with_build_tool(
        context: ProjectContext,
        model_sink: Arc<dyn ProjectModelSink>,
    ) -> Self {
        Self::open(context, Arc::new(CommandBuildInvoker::default()), model_sink)
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn manager(&self) -> &BlazeSyncManager {
        &self.manager
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn stats(&self) -> &Arc<SyncStatsLog> {
        &self.context.stats
    }

    /// Cancel the running sync and fail everything still queued. Dropping the project does the
    /// same.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for BlazeProject {
    fn drop(&mut self) {
        tracing::info!(target: "blaze.sync", "closing project");
        self.coordinator.shutdown();
    }
}
