use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Node;
use crate::capability::{Capabilities, CompletionRequest, Purpose};
use crate::error::{CapabilityError, NodeExecutionError};
use crate::plan::{TaskId, TaskStatus};
use crate::state::JobState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateUpdate {
    pub deliverable: String,
    /// Completed tasks whose results went into the deliverable.
    pub included: Vec<TaskId>,
    /// Failed and cancelled tasks left out of it.
    pub excluded: Vec<TaskId>,
}

/// Combines completed task results into the final deliverable.
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for Aggregator {
    type Update = AggregateUpdate;

    fn role(&self) -> &'static str {
        "aggregator"
    }

    async fn run(
        &self,
        state: &JobState,
        caps: &Capabilities,
    ) -> Result<AggregateUpdate, NodeExecutionError> {
        if state.plan.has_active() {
            return Err(NodeExecutionError::new(
                self.role(),
                CapabilityError::Rejected("tasks are still pending or in progress".into()),
            ));
        }

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut sections = String::new();
        for task in state.plan.tasks() {
            match (task.status, &task.result) {
                (TaskStatus::Completed, Some(result)) => {
                    included.push(task.id);
                    sections.push_str(&format!(
                        "## Task #{} [{}]: {}\n{}\n\n",
                        task.id, task.role, task.goal, result
                    ));
                }
                _ => excluded.push(task.id),
            }
        }

        if included.is_empty() {
            tracing::warn!(
                target: "taskweave.nodes",
                job_id = %state.job_id,
                excluded = excluded.len(),
                "no completed task to aggregate"
            );
            return Ok(AggregateUpdate {
                deliverable: String::new(),
                included,
                excluded,
            });
        }

        let mut prompt = format!(
            "Combine the work of the team into one coherent deliverable for this request:\n{}\n\n",
            state.request_text()
        );
        prompt.push_str(&sections);
        if !excluded.is_empty() {
            prompt.push_str(&format!(
                "Tasks {excluded:?} did not complete; note any gaps they leave.\n"
            ));
        }

        let deliverable = caps
            .complete(CompletionRequest::text(Purpose::Aggregate, prompt))
            .await
            .map_err(|e| NodeExecutionError::new(self.role(), e))?;

        tracing::info!(
            target: "taskweave.nodes",
            job_id = %state.job_id,
            included = included.len(),
            excluded = excluded.len(),
            "deliverable aggregated"
        );
        Ok(AggregateUpdate {
            deliverable,
            included,
            excluded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::Canned;
    use crate::plan::{TaskDraft, WorkerRole};
    use pretty_assertions::assert_eq;

    fn two_task_state() -> JobState {
        let mut state = JobState::new("job-1", "user-1", "todo api");
        state
            .plan
            .add_drafts(&[
                TaskDraft::new(WorkerRole::Database, "schema"),
                TaskDraft::new(WorkerRole::CodeBuilder, "handlers"),
            ])
            .unwrap();
        let schema = state.plan.get_mut(1).unwrap();
        schema.transition(TaskStatus::InProgress).unwrap();
        schema.transition(TaskStatus::Completed).unwrap();
        schema.result = Some("CREATE TABLE todos".into());
        state
    }

    #[tokio::test]
    async fn test_refuses_while_tasks_are_active() {
        let canned = Canned::replying("deliverable");
        let state = two_task_state();

        let err = Aggregator::new()
            .run(&state, &canned.capabilities())
            .await
            .unwrap_err();
        assert_eq!(err.role, "aggregator");
        assert!(matches!(err.cause, CapabilityError::Rejected(_)));
        assert!(canned.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_task_is_excluded_from_deliverable() {
        let canned = Canned::replying("deliverable");
        let mut state = two_task_state();
        let handlers = state.plan.get_mut(2).unwrap();
        handlers.transition(TaskStatus::InProgress).unwrap();
        handlers.transition(TaskStatus::Failed).unwrap();

        let update = Aggregator::new()
            .run(&state, &canned.capabilities())
            .await
            .unwrap();
        assert_eq!(update.deliverable, "deliverable");
        assert_eq!(update.included, vec![1]);
        assert_eq!(update.excluded, vec![2]);

        let calls = canned.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("CREATE TABLE todos"));
        assert!(calls[0].prompt.contains("Tasks [2] did not complete"));
    }
}
