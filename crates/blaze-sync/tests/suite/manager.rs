use blaze_config::BlazeConfig;
use blaze_sync::test_support::{
    target, target_map, DeferredReadiness, RecordingSubmitter, StaticConfirmationGate,
    StaticPreferences, SubmittedJob,
};
use blaze_sync::{
    BlazeSyncManager, BuildSystem, ImportSettings, ProjectContext, SyncError, SyncMode,
    SyncOutcome, SyncResult,
};
use std::sync::Arc;

fn managed_context() -> ProjectContext {
    ProjectContext::new(
        Some(ImportSettings::new("demo", "/ws", BuildSystem::Bazel)),
        BlazeConfig::default(),
    )
}

fn manager(context: ProjectContext) -> (BlazeSyncManager, Arc<RecordingSubmitter>) {
    let submitter = Arc::new(RecordingSubmitter::new());
    let manager = BlazeSyncManager::new(Arc::new(context), submitter.clone());
    (manager, submitter)
}

fn single_job(submitter: &RecordingSubmitter) -> SubmittedJob {
    let jobs = submitter.jobs();
    assert_eq!(jobs.len(), 1, "expected exactly one submission: {jobs:?}");
    jobs.into_iter().next().unwrap()
}

fn assert_directory_pre_pass(job: &SubmittedJob) {
    assert_eq!(job.params.title(), "Initial directory update");
    assert_eq!(job.params.sync_mode(), SyncMode::NoBuild);
    assert!(job.params.background_sync());
    assert!(job.params.target_expressions().is_empty());
}

#[test]
fn full_sync_is_preceded_by_one_directory_pre_pass() {
    let (manager, submitter) = manager(managed_context());

    let handle = manager.full_sync().unwrap();
    assert!(handle.is_some());

    let job = single_job(&submitter);
    assert_directory_pre_pass(&job);
    let main = job.then.expect("full sync continuation");
    assert_eq!(main.title(), "Full Sync");
    assert_eq!(main.sync_mode(), SyncMode::Full);
    assert!(!main.background_sync());
    assert!(main.add_project_view_targets());
    assert!(!main.add_working_set());
    assert!(main.target_expressions().is_empty());
    assert_eq!(main.build_params().binary_path, "bazel");
}

#[test]
fn full_and_incremental_follow_the_working_set_preference() {
    let context = managed_context().with_preferences(Arc::new(StaticPreferences {
        expand_sync_to_working_set: true,
    }));
    let (manager, submitter) = manager(context);

    manager.full_sync().unwrap();
    manager.incremental_sync().unwrap();

    let jobs = submitter.jobs();
    assert_eq!(jobs.len(), 2);
    for job in jobs {
        let main = job.then.expect("continuation");
        assert!(main.add_working_set(), "{main}");
        assert!(main.add_project_view_targets(), "{main}");
    }
}

#[test]
fn incremental_sync_params() {
    let (manager, submitter) = manager(managed_context());
    manager.incremental_sync().unwrap();

    let job = single_job(&submitter);
    assert_directory_pre_pass(&job);
    let main = job.then.expect("continuation");
    assert_eq!(main.title(), "Sync");
    assert_eq!(main.sync_mode(), SyncMode::Incremental);
    assert!(!main.background_sync());
    assert!(main.add_project_view_targets());
    assert!(main.target_expressions().is_empty());
}

#[test]
fn partial_sync_params() {
    let (manager, submitter) = manager(managed_context());
    manager
        .partial_sync([target("//java/a:lib"), target("//java/b:lib")])
        .unwrap();

    let main = single_job(&submitter).then.expect("continuation");
    assert_eq!(main.title(), "Partial Sync");
    assert_eq!(main.sync_mode(), SyncMode::Partial);
    assert!(!main.add_project_view_targets());
    assert!(!main.add_working_set());
    assert_eq!(
        main.target_expressions().iter().cloned().collect::<Vec<_>>(),
        vec![target("//java/a:lib"), target("//java/b:lib")]
    );
}

#[test]
fn working_set_sync_params() {
    let (manager, submitter) = manager(managed_context());
    manager.working_set_sync().unwrap();

    let main = single_job(&submitter).then.expect("continuation");
    assert_eq!(main.title(), "Sync Working Set");
    assert_eq!(main.sync_mode(), SyncMode::Partial);
    assert!(main.add_working_set());
    assert!(!main.add_project_view_targets());
    assert!(main.target_expressions().is_empty());
}

#[test]
fn background_directory_update_skips_confirmation_and_pre_pass() {
    let gate = Arc::new(StaticConfirmationGate::new(false));
    let (manager, submitter) = manager(managed_context().with_confirmation(gate.clone()));

    assert!(manager.directory_update(true).unwrap().is_some());

    assert_eq!(gate.prompts(), 0);
    let job = single_job(&submitter);
    assert_eq!(job.params.title(), "Update Directories");
    assert_eq!(job.params.sync_mode(), SyncMode::NoBuild);
    assert!(job.params.background_sync());
    assert!(job.then.is_none());
}

#[test]
fn confirmed_foreground_directory_update_is_submitted() {
    let gate = Arc::new(StaticConfirmationGate::new(true));
    let (manager, submitter) = manager(managed_context().with_confirmation(gate.clone()));

    assert!(manager.directory_update(false).unwrap().is_some());

    assert_eq!(gate.prompts(), 1);
    let job = single_job(&submitter);
    assert!(!job.params.background_sync());
    assert!(job.then.is_none());
}

#[test]
fn declined_directory_update_submits_nothing_and_records_nothing() {
    let gate = Arc::new(StaticConfirmationGate::new(false));
    let context = managed_context().with_confirmation(gate.clone());
    let stats = context.stats.clone();
    let (manager, submitter) = manager(context);

    assert!(manager.directory_update(false).unwrap().is_none());

    assert_eq!(gate.prompts(), 1);
    assert!(submitter.jobs().is_empty());
    assert!(stats.is_empty());
}

#[test]
fn unmanaged_project_is_rejected_synchronously() {
    let (manager, submitter) = manager(ProjectContext::new(None, BlazeConfig::default()));

    let err = manager.full_sync().unwrap_err();
    assert_eq!(
        err,
        SyncError::Configuration {
            build_system: "Bazel".to_string()
        }
    );
    assert_eq!(err.to_string(), "Attempt to sync non-Bazel project.");
    assert!(submitter.jobs().is_empty());
}

#[test]
fn requests_wait_for_project_readiness() {
    let readiness = Arc::new(DeferredReadiness::new());
    let (manager, submitter) = manager(managed_context().with_readiness(readiness.clone()));

    let handle = manager.incremental_sync().unwrap().expect("handle");
    assert!(submitter.jobs().is_empty());
    assert_eq!(readiness.pending(), 1);

    readiness.fire();
    assert_eq!(submitter.jobs().len(), 1);

    let outcome = SyncOutcome {
        title: "Sync".to_string(),
        sync_mode: SyncMode::Incremental,
        result: SyncResult::Succeeded,
        message: None,
    };
    submitter.finish_all(Ok(outcome.clone()));
    assert_eq!(handle.wait(), Ok(outcome));
}

#[test]
fn deferred_configuration_error_resolves_the_handle() {
    let readiness = Arc::new(DeferredReadiness::new());
    let mut context =
        ProjectContext::new(None, BlazeConfig::default()).with_readiness(readiness.clone());
    context.default_build_system = BuildSystem::Blaze;
    let (manager, submitter) = manager(context);

    let handle = manager.working_set_sync().unwrap().expect("handle");
    readiness.fire();

    assert!(submitter.jobs().is_empty());
    assert_eq!(
        handle.wait(),
        Err(SyncError::Configuration {
            build_system: "Blaze".to_string()
        })
    );
}

#[test]
fn startup_sync_runs_in_the_background_without_pre_pass() {
    let (manager, submitter) = manager(managed_context());
    manager.startup_sync().unwrap();

    let job = single_job(&submitter);
    assert_eq!(job.params.sync_mode(), SyncMode::Startup);
    assert!(job.params.background_sync());
    assert!(job.then.is_none());
}

#[test]
fn filters_are_deferred_until_ready() {
    let readiness = Arc::new(DeferredReadiness::new());
    let (manager, submitter) = manager(managed_context().with_readiness(readiness.clone()));

    let handle = manager.filter_project_targets(|key| key.label().starts_with("//keep"));
    assert_eq!(submitter.filter_count(), 0);

    readiness.fire();
    assert_eq!(submitter.filter_count(), 1);

    let mut map = target_map(&["//keep:a", "//drop:b", "//keep:c"]);
    submitter.run_filters(&mut map);
    assert_eq!(handle.wait(), Ok(1));
    assert_eq!(map.len(), 2);
    assert!(submitter.jobs().is_empty());
}
