//! [`BuildInvoker`] backed by the build tool's command line.
//!
//! The directory pass runs `<binary> info`. A build runs `<binary> build` over the scope and then
//! asks `<binary> query --output=label_kind` for the rules it covered.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::collaborators::{BuildFailure, BuildOutputs, DirectoryStructure, TargetScope};
use crate::command::{CommandError, CommandRunner, DefaultCommandRunner};
use crate::info::run_blaze_info;
use crate::{
    BlazeBuildParams, BuildInvoker, CancellationToken, TargetIdeInfo, TargetKey, TargetMap,
};

pub struct CommandBuildInvoker<R = DefaultCommandRunner> {
    runner: R,
}

impl<R> fmt::Debug for CommandBuildInvoker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuildInvoker").finish_non_exhaustive()
    }
}

impl Default for CommandBuildInvoker {
    fn default() -> Self {
        Self::new(DefaultCommandRunner)
    }
}

impl<R: CommandRunner> CommandBuildInvoker<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn run(
        &self,
        workspace_root: &Path,
        build_params: &BlazeBuildParams,
        args: &[&str],
        cancellation: &CancellationToken,
    ) -> Result<String, BuildFailure> {
        self.runner
            .run(workspace_root, &build_params.binary_path, args, cancellation)
            .map(|output| output.stdout)
            .map_err(|err| match err {
                CommandError::Failed { stderr, .. } => BuildFailure::new(format!(
                    "`{} {}` failed:\n{}",
                    build_params.binary_path,
                    args.first().copied().unwrap_or_default(),
                    stderr.trim_end()
                )),
                other => BuildFailure::new(other.to_string()),
            })
    }
}

impl<R: CommandRunner> BuildInvoker for CommandBuildInvoker<R> {
    fn run_build(
        &self,
        scope: &TargetScope,
        build_params: &BlazeBuildParams,
        workspace_root: &Path,
        cancellation: CancellationToken,
    ) -> Result<BuildOutputs, BuildFailure> {
        let mut args = vec!["build"];
        args.extend(build_params.build_flags.iter().map(String::as_str));
        args.push("--");
        // Patterns apply left to right, so exclusions go last.
        let (excluded, included): (Vec<&str>, Vec<&str>) = scope
            .as_args()
            .into_iter()
            .partition(|target| target.starts_with('-'));
        if included.is_empty() {
            return Ok(BuildOutputs::default());
        }
        args.extend(included);
        args.extend(excluded);
        self.run(workspace_root, build_params, &args, &cancellation)?;

        let expression = query_expression(scope);
        let stdout = self.run(
            workspace_root,
            build_params,
            &["query", "--output=label_kind", expression.as_str()],
            &cancellation,
        )?;
        let targets = parse_label_kind(&stdout);
        tracing::debug!(
            target: "blaze.sync",
            rules = targets.len(),
            "collected rules from build scope"
        );
        Ok(BuildOutputs { targets })
    }

    fn query_workspace_info(
        &self,
        build_params: &BlazeBuildParams,
        workspace_root: &Path,
    ) -> anyhow::Result<DirectoryStructure> {
        let info = run_blaze_info(
            &self.runner,
            build_params,
            workspace_root,
            &CancellationToken::new(),
        )?;

        // Output trees symlinked into the workspace are not sources.
        let excluded_roots: BTreeSet<PathBuf> = [
            info.execution_root(),
            info.output_base(),
            info.output_path(),
        ]
        .into_iter()
        .flatten()
        .filter(|path| path.starts_with(workspace_root))
        .collect();

        Ok(DirectoryStructure {
            info,
            source_roots: BTreeSet::from([workspace_root.to_path_buf()]),
            excluded_roots,
        })
    }
}

/// `a + b - c` for a scope of `a`, `b` and `-c`.
fn query_expression(scope: &TargetScope) -> String {
    let mut expression = String::new();
    for target in scope.targets.iter().filter(|target| !target.is_excluded()) {
        if !expression.is_empty() {
            expression.push_str(" + ");
        }
        expression.push_str(target.as_str());
    }
    for target in scope.targets.iter().filter(|target| target.is_excluded()) {
        expression.push_str(" - ");
        expression.push_str(&target.as_str()[1..]);
    }
    expression
}

/// Parse `java_library rule //java/a:lib` lines. Source and generated files are skipped.
fn parse_label_kind(stdout: &str) -> TargetMap {
    let mut targets = TargetMap::new();
    for line in stdout.lines() {
        let mut parts = line.split_whitespace();
        let (Some(kind), Some("rule"), Some(label), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        targets.insert(
            TargetKey::for_label(label),
            TargetIdeInfo {
                kind: kind.to_string(),
                ..TargetIdeInfo::default()
            },
        );
    }
    targets
}
