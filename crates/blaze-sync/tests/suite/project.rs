use blaze_config::{load_for_workspace, with_config_env_lock, BlazeConfig, BLAZE_CONFIG_ENV_VAR};
use blaze_sync::test_support::{
    target, RecordingModelSink, RecordingSubmitter, ScriptedBuildInvoker, StaticScope,
};
use blaze_sync::{
    BlazeProject, BlazeSyncManager, BuildSystem, ImportSettings, ProjectContext, SyncError,
    SyncResult,
};
use std::sync::Arc;

#[test]
fn workspace_config_feeds_build_params_and_preferences() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(
        workspace.path().join("blaze.toml"),
        r#"
[sync]
expand_sync_to_working_set = true

[build]
binary = "/opt/bin/bazelisk"
flags = ["--config=ide", "  "]
"#,
    )
    .unwrap();

    let (config, path) = with_config_env_lock(|| {
        assert!(std::env::var_os(BLAZE_CONFIG_ENV_VAR).is_none());
        load_for_workspace(workspace.path())
    })
    .unwrap();
    assert!(path.is_some());

    let settings = ImportSettings::new("demo", workspace.path(), BuildSystem::Bazel);
    let context = Arc::new(ProjectContext::new(Some(settings), config));
    let build_params = context.build_params();
    assert_eq!(build_params.binary_path, "/opt/bin/bazelisk");
    assert_eq!(build_params.build_flags, vec!["--config=ide".to_string()]);

    let submitter = Arc::new(RecordingSubmitter::new());
    let manager = BlazeSyncManager::new(context, submitter.clone());
    manager.full_sync().unwrap();

    let jobs = submitter.jobs();
    let main = jobs[0].then.as_ref().expect("continuation");
    assert!(main.add_working_set());
    assert_eq!(main.build_params(), &build_params);
    assert_eq!(jobs[0].params.build_params(), &build_params);
}

#[test]
fn unmanaged_project_opens_but_refuses_to_sync() {
    let sink = Arc::new(RecordingModelSink::new());
    let invoker = Arc::new(ScriptedBuildInvoker::new());
    let project = BlazeProject::open(
        ProjectContext::new(None, BlazeConfig::default()),
        invoker.clone(),
        sink.clone(),
    );

    assert!(matches!(
        project.manager().incremental_sync(),
        Err(SyncError::Configuration { .. })
    ));
    assert!(matches!(
        project.manager().directory_update(true),
        Err(SyncError::Configuration { .. })
    ));
    assert!(project.stats().is_empty());
    assert_eq!(invoker.info_count(), 0);
    assert!(sink.target_maps().is_empty());
    project.close();
}

#[test]
fn dropping_the_project_shuts_the_coordinator_down() {
    let settings = ImportSettings::new("demo", "/ws", BuildSystem::Blaze);
    let project = BlazeProject::open(
        ProjectContext::new(Some(settings), BlazeConfig::default()),
        Arc::new(ScriptedBuildInvoker::new()),
        Arc::new(RecordingModelSink::new()),
    );
    let manager = project.manager().clone();
    drop(project);

    let handle = manager
        .directory_update(true)
        .unwrap()
        .expect("background update is never declined");
    assert_eq!(handle.wait(), Err(SyncError::CoordinatorShutdown));
}

#[cfg(unix)]
#[test]
fn build_tool_binary_drives_a_full_sync() {
    use std::os::unix::fs::PermissionsExt;

    let workspace = tempfile::tempdir().unwrap();
    let tool = workspace.path().join("fake-bazel");
    std::fs::write(
        &tool,
        r#"#!/bin/sh
case "$1" in
  info)
    echo "execution_root: /cache/execroot/_main"
    echo "output_path: $PWD/bazel-out"
    ;;
  build)
    echo "$@" > build-args.txt
    ;;
  query)
    echo "java_library rule //java/a:lib"
    echo "source file //java/a:A.java"
    echo "java_test rule //java/a:test"
    ;;
  *)
    exit 2
    ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = BlazeConfig::default();
    config.build.binary = Some(tool.display().to_string());
    config.build.flags = vec!["--config=ide".to_string()];
    let settings = ImportSettings::new("demo", workspace.path(), BuildSystem::Bazel);
    let context = ProjectContext::new(Some(settings), config).with_scope_provider(Arc::new(
        StaticScope {
            project_view: vec![target("//java/..."), target("-//java/gen:all")],
            ..StaticScope::default()
        },
    ));
    let sink = Arc::new(RecordingModelSink::new());
    let project = BlazeProject::open_with_build_tool(context, sink.clone());

    let outcome = project
        .manager()
        .full_sync()
        .unwrap()
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(outcome.result, SyncResult::Succeeded, "{outcome:?}");
    let labels: Vec<_> = project
        .coordinator()
        .retained_target_map()
        .keys()
        .map(|key| key.label().to_string())
        .collect();
    assert_eq!(labels, vec!["//java/a:lib", "//java/a:test"]);
    assert_eq!(sink.directory_updates(), 2);
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("build-args.txt"))
            .unwrap()
            .trim_end(),
        "build --config=ide -- //java/... -//java/gen:all"
    );
}
