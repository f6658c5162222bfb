mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use taskweave_core::capability::Purpose;
use taskweave_core::executor::{DependencyScheduler, JobOutcome};
use taskweave_core::jobs::JobController;
use taskweave_core::plan::{DependencyRef, TaskDraft, TaskStatus, WorkerRole};
use taskweave_core::state::{FileJobStore, JobRecord, JobState, JobStatus, JobStore, Stage};

use common::{build_goal, capabilities, happy_path, settings, MarkerSandbox, ScriptedReasoning};

/// State as it would have been checkpointed mid-execution before a crash.
fn interrupted_state() -> JobState {
    let mut state = JobState::new("job-crashed", "user-1", "notes app");
    state.clarified_request = Some("A notes app with search".into());
    state
        .plan
        .add_drafts(&[
            TaskDraft::new(WorkerRole::Database, "notes table").keyed("db"),
            TaskDraft::new(WorkerRole::CodeBuilder, "search endpoint")
                .after(DependencyRef::Key("db".into())),
        ])
        .unwrap();
    let dispatch = DependencyScheduler::new(2).next_dispatch(&mut state.plan, 0);
    assert_eq!(dispatch.started, vec![1]);
    state.stage = Stage::Execute;
    state
}

#[tokio::test]
async fn running_job_resumes_from_the_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::new(dir.path()).unwrap());
    assert_ok!(store.save(&JobRecord::new(interrupted_state())).await);

    let reasoning = Arc::new(ScriptedReasoning::new(happy_path(r#"{"tasks": []}"#)));
    let jobs = JobController::new(
        capabilities(reasoning.clone(), Arc::new(MarkerSandbox::passing())),
        settings(),
        store.clone(),
    );

    let resumed = assert_ok!(jobs.resume("job-crashed").await);
    assert_eq!(resumed.plan.get(1).unwrap().status, TaskStatus::Pending);

    let outcome = assert_ok!(jobs.wait("job-crashed").await);
    assert!(outcome.is_success());

    let builds: Vec<String> = reasoning
        .calls_for(Purpose::Build)
        .iter()
        .map(|c| build_goal(&c.prompt))
        .collect();
    assert_eq!(builds, vec!["notes table".to_string(), "search endpoint".to_string()]);
    assert!(reasoning.calls_for(Purpose::Plan).is_empty());
    assert!(reasoning.calls_for(Purpose::Clarify).is_empty());

    let record = store.load("job-crashed").await.unwrap().unwrap();
    assert_eq!(record.state.status, JobStatus::Succeeded);
    assert_eq!(record.state.completed.len(), 2);
}

#[tokio::test]
async fn paused_job_is_restored_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::new(dir.path()).unwrap());

    let mut paused = JobState::new("job-paused", "user-1", "an app");
    paused.status = JobStatus::AwaitingClarification;
    paused.clarification.questions = vec!["Web or mobile?".into()];
    store.save(&JobRecord::new(paused)).await.unwrap();

    let reasoning = Arc::new(ScriptedReasoning::new(happy_path(
        r#"{"tasks": [{"role": "frontend", "goal": "web ui"}]}"#,
    )));
    let jobs = JobController::new(
        capabilities(reasoning.clone(), Arc::new(MarkerSandbox::passing())),
        settings(),
        store.clone(),
    );

    let restored = jobs.resume("job-paused").await.unwrap();
    assert_eq!(restored.status, JobStatus::AwaitingClarification);
    assert_eq!(
        jobs.wait("job-paused").await.unwrap(),
        JobOutcome::AwaitingClarification {
            questions: vec!["Web or mobile?".into()]
        }
    );
    assert!(reasoning.calls().is_empty());

    jobs.answer_clarification("job-paused", vec!["web".into()])
        .await
        .unwrap();
    assert!(jobs.wait("job-paused").await.unwrap().is_success());
    assert_eq!(
        jobs.list_jobs().await.unwrap(),
        vec!["job-paused".to_string()]
    );
}
