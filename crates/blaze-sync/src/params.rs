use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::project::{BuildSystem, ImportSettings};
use crate::{SyncMode, TargetExpression};

/// Build tool invocation parameters. Opaque to the sync core; forwarded to the
/// [`crate::BuildInvoker`] untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlazeBuildParams {
    pub binary_path: String,
    #[serde(default)]
    pub build_flags: Vec<String>,
}

impl BlazeBuildParams {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            build_flags: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.build_flags.extend(flags);
        self
    }

    /// Parameters for the given project: configured binary (or the build system's default) plus
    /// configured flags.
    pub fn from_project(settings: &ImportSettings, build: &blaze_config::BuildConfig) -> Self {
        let binary = build
            .binary
            .clone()
            .unwrap_or_else(|| settings.build_system.default_binary().to_string());
        Self::new(binary).with_flags(build.flags.iter().cloned())
    }

    pub fn for_build_system(build_system: BuildSystem) -> Self {
        Self::new(build_system.default_binary())
    }
}

/// Parameters that control one sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlazeSyncParams {
    title: String,
    sync_mode: SyncMode,
    build_params: BlazeBuildParams,
    background_sync: bool,
    add_project_view_targets: bool,
    add_working_set: bool,
    target_expressions: BTreeSet<TargetExpression>,
}

impl BlazeSyncParams {
    /// Start building a request. Title, mode and build parameters are mandatory; everything else
    /// defaults to off/empty.
    pub fn builder(
        title: impl Into<String>,
        sync_mode: SyncMode,
        build_params: BlazeBuildParams,
    ) -> BlazeSyncParamsBuilder {
        BlazeSyncParamsBuilder {
            params: BlazeSyncParams {
                title: title.into(),
                sync_mode,
                build_params,
                background_sync: false,
                add_project_view_targets: false,
                add_working_set: false,
                target_expressions: BTreeSet::new(),
            },
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn build_params(&self) -> &BlazeBuildParams {
        &self.build_params
    }

    /// Suppress interactive warnings and run silently.
    pub fn background_sync(&self) -> bool {
        self.background_sync
    }

    /// Include every target declared in the active project view.
    pub fn add_project_view_targets(&self) -> bool {
        self.add_project_view_targets
    }

    /// Include the targets touched by pending VCS changes.
    pub fn add_working_set(&self) -> bool {
        self.add_working_set
    }

    pub fn target_expressions(&self) -> &BTreeSet<TargetExpression> {
        &self.target_expressions
    }

    pub fn to_builder(&self) -> BlazeSyncParamsBuilder {
        BlazeSyncParamsBuilder {
            params: self.clone(),
        }
    }

    /// Combine two requests into one that does at least the work of both.
    ///
    /// The stronger mode wins along with its title and build parameters; on equal modes `first`
    /// wins. Any foreground request makes the result foreground. Scopes and flags are unioned.
    pub fn combine(first: &BlazeSyncParams, second: &BlazeSyncParams) -> BlazeSyncParams {
        let base = if second.sync_mode > first.sync_mode {
            second
        } else {
            first
        };
        BlazeSyncParams {
            title: base.title.clone(),
            sync_mode: base.sync_mode,
            build_params: base.build_params.clone(),
            background_sync: first.background_sync && second.background_sync,
            add_project_view_targets: first.add_project_view_targets
                || second.add_project_view_targets,
            add_working_set: first.add_working_set || second.add_working_set,
            target_expressions: first
                .target_expressions
                .union(&second.target_expressions)
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Display for BlazeSyncParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.sync_mode)
    }
}

#[derive(Debug, Clone)]
pub struct BlazeSyncParamsBuilder {
    params: BlazeSyncParams,
}

impl BlazeSyncParamsBuilder {
    pub fn background_sync(mut self, value: bool) -> Self {
        self.params.background_sync = value;
        self
    }

    pub fn add_project_view_targets(mut self, value: bool) -> Self {
        self.params.add_project_view_targets = value;
        self
    }

    pub fn add_working_set(mut self, value: bool) -> Self {
        self.params.add_working_set = value;
        self
    }

    pub fn add_target_expression(mut self, target: TargetExpression) -> Self {
        self.params.target_expressions.insert(target);
        self
    }

    pub fn add_target_expressions(
        mut self,
        targets: impl IntoIterator<Item = TargetExpression>,
    ) -> Self {
        self.params.target_expressions.extend(targets);
        self
    }

    pub fn build(self) -> BlazeSyncParams {
        self.params
    }
}
