//! Per-task worker: build, then (with intensive validation) generate tests,
//! run them in the sandbox and repair until they pass or the cap is hit.
//!
//! ```text
//! Build ─▶ GenerateTests ─▶ Execute ──passed──▶ completed
//!                              │  ▲
//!                        failed│  │ repair (≤ N)
//!                              ▼  │
//!                             Repair ──cap hit──▶ failed
//! ```

use serde::{Deserialize, Serialize};

use super::json::{extract_json, preview};
use crate::capability::{
    call_with_retry, Capabilities, CompletionRequest, ContextSnippet, Purpose, SandboxOutcome,
};
use crate::error::{CapabilityError, ExecutorError};
use crate::plan::{SelfValidationStatus, Task, TaskId, TaskStatus, WorkerRole};
use crate::state::JobState;

/// Read-only slice of job state handed to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task: Task,
    pub request: String,
    pub context: Vec<ContextSnippet>,
    /// Results of the task's (completed) dependencies.
    pub dependency_results: Vec<(TaskId, String)>,
}

impl TaskSnapshot {
    pub fn from_state(state: &JobState, task_id: TaskId) -> Option<Self> {
        let task = state.plan.get(task_id)?.clone();
        let dependency_results = task
            .dependencies
            .iter()
            .filter_map(|dep| {
                let result = state.plan.get(*dep)?.result.clone()?;
                Some((*dep, result))
            })
            .collect();
        Some(Self {
            task,
            request: state.request_text(),
            context: state.context.clone(),
            dependency_results,
        })
    }
}

/// What a worker reports back on the completion channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    /// `Completed` or `Failed`.
    pub status: TaskStatus,
    #[serde(default)]
    pub artifact: Option<String>,
    #[serde(default)]
    pub generated_tests: Option<Vec<String>>,
    #[serde(default)]
    pub self_validation: Option<SelfValidationStatus>,
    #[serde(default)]
    pub repair_attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn completed(task_id: TaskId, artifact: impl Into<String>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            artifact: Some(artifact.into()),
            generated_tests: None,
            self_validation: None,
            repair_attempts: 0,
            error: None,
        }
    }

    pub fn failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            artifact: None,
            generated_tests: None,
            self_validation: None,
            repair_attempts: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedTests {
    #[serde(default)]
    tests: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Worker {
    intensive_validation: bool,
    repair_attempts: u32,
}

impl Worker {
    pub fn new(intensive_validation: bool, repair_attempts: u32) -> Self {
        Self {
            intensive_validation,
            repair_attempts,
        }
    }

    /// Run one task to a terminal outcome. Capability failures end the task
    /// as `failed`; they never escape as errors.
    pub async fn execute(&self, snapshot: TaskSnapshot, caps: &Capabilities) -> TaskOutcome {
        let task_id = snapshot.task.id;
        match self.try_execute(&snapshot, caps).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    target: "taskweave.worker",
                    task_id = task_id,
                    role = %snapshot.task.role,
                    error = %err,
                    "task failed on capability error"
                );
                TaskOutcome::failed(task_id, format!("{} worker: {err}", snapshot.task.role))
            }
        }
    }

    async fn try_execute(
        &self,
        snapshot: &TaskSnapshot,
        caps: &Capabilities,
    ) -> Result<TaskOutcome, CapabilityError> {
        let task = &snapshot.task;
        tracing::debug!(target: "taskweave.worker", task_id = task.id, role = %task.role, "build");

        let mut artifact = caps
            .complete(CompletionRequest::text(Purpose::Build, build_prompt(snapshot)))
            .await?;

        if task.role == WorkerRole::Deployment {
            let spec = artifact.clone();
            let handle = call_with_retry(caps.retry.as_ref(), "provision", || {
                caps.provisioning.provision(&spec)
            })
            .await?;
            tracing::info!(
                target: "taskweave.worker",
                task_id = task.id,
                resource = %handle.id,
                "resource provisioned"
            );
            artifact.push_str(&format!("\n\nProvisioned resource: {}", handle.id));
            if let Some(details) = handle.details {
                artifact.push('\n');
                artifact.push_str(&details);
            }
        }

        if !self.intensive_validation {
            return Ok(TaskOutcome::completed(task.id, artifact));
        }

        let tests = self.generate_tests(snapshot, &artifact, caps).await?;
        let mut repairs = 0u32;
        loop {
            let outcome = self.run_sandbox(&artifact, &tests, caps).await?;
            if outcome.passed {
                tracing::info!(
                    target: "taskweave.worker",
                    task_id = task.id,
                    repairs = repairs,
                    "self-validation passed"
                );
                return Ok(TaskOutcome {
                    task_id: task.id,
                    status: TaskStatus::Completed,
                    artifact: Some(artifact),
                    generated_tests: Some(tests),
                    self_validation: Some(SelfValidationStatus::Passed),
                    repair_attempts: repairs,
                    error: None,
                });
            }

            if repairs >= self.repair_attempts {
                let failure = ExecutorError::TaskValidationFailure {
                    task_id: task.id,
                    details: format!(
                        "tests still failing after {repairs} repair attempt(s): {}",
                        preview(&outcome.log, 500)
                    ),
                };
                tracing::warn!(target: "taskweave.worker", task_id = task.id, "{failure}");
                return Ok(TaskOutcome {
                    task_id: task.id,
                    status: TaskStatus::Failed,
                    artifact: None,
                    generated_tests: Some(tests),
                    self_validation: Some(SelfValidationStatus::Failed),
                    repair_attempts: repairs,
                    error: Some(failure.to_string()),
                });
            }

            repairs += 1;
            tracing::debug!(
                target: "taskweave.worker",
                task_id = task.id,
                attempt = repairs,
                "self-validation failed, repairing"
            );
            artifact = caps
                .complete(CompletionRequest::text(
                    Purpose::Repair,
                    repair_prompt(snapshot, &artifact, &tests, &outcome.log),
                ))
                .await?;
        }
    }

    async fn generate_tests(
        &self,
        snapshot: &TaskSnapshot,
        artifact: &str,
        caps: &Capabilities,
    ) -> Result<Vec<String>, CapabilityError> {
        let raw = caps
            .complete(CompletionRequest::structured(
                Purpose::GenerateTests,
                tests_prompt(snapshot, artifact),
                serde_json::json!({
                    "type": "object",
                    "properties": { "tests": { "type": "array", "items": { "type": "string" } } },
                    "required": ["tests"]
                }),
            ))
            .await?;

        let tests = extract_json(&raw)
            .and_then(|v| serde_json::from_value::<GeneratedTests>(v).ok())
            .map(|g| g.tests)
            .unwrap_or_else(|| vec![raw.clone()]);
        let tests: Vec<String> = tests.into_iter().filter(|t| !t.trim().is_empty()).collect();
        if tests.is_empty() {
            return Err(CapabilityError::InvalidResponse(
                "test generation returned no tests".into(),
            ));
        }
        Ok(tests)
    }

    async fn run_sandbox(
        &self,
        artifact: &str,
        tests: &[String],
        caps: &Capabilities,
    ) -> Result<SandboxOutcome, CapabilityError> {
        call_with_retry(caps.retry.as_ref(), "sandbox", || {
            caps.sandbox.run(artifact, tests)
        })
        .await
    }
}

fn build_prompt(snapshot: &TaskSnapshot) -> String {
    let task = &snapshot.task;
    let mut prompt = format!(
        "You are the {} worker on a software build team.\n\
         Overall request:\n{}\n\nYour task (#{}):\n{}\n",
        task.role, snapshot.request, task.id, task.goal
    );
    if !snapshot.dependency_results.is_empty() {
        prompt.push_str("\nOutput of the tasks you depend on:\n");
        for (id, result) in &snapshot.dependency_results {
            prompt.push_str(&format!("## Task #{id}\n{}\n", preview(result, 2_000)));
        }
    }
    if !snapshot.context.is_empty() {
        prompt.push_str("\nReference material:\n");
        for snippet in &snapshot.context {
            prompt.push_str("- ");
            prompt.push_str(&preview(&snippet.content, 500));
            prompt.push('\n');
        }
    }
    prompt.push_str("\nProduce the complete artifact for your task.");
    prompt
}

fn tests_prompt(snapshot: &TaskSnapshot, artifact: &str) -> String {
    format!(
        "Write automated tests that check this artifact fulfils its task.\n\
         Task: {}\n\nArtifact:\n{}\n\nRespond with JSON: {{\"tests\": [\"...\"]}}",
        snapshot.task.goal, artifact
    )
}

fn repair_prompt(snapshot: &TaskSnapshot, artifact: &str, tests: &[String], log: &str) -> String {
    format!(
        "The artifact for this task fails its tests. Return a corrected artifact.\n\
         Task: {}\n\nArtifact:\n{}\n\nTests:\n{}\n\nTest log:\n{}",
        snapshot.task.goal,
        artifact,
        tests.join("\n\n"),
        preview(log, 4_000)
    )
}
