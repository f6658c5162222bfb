use std::collections::HashSet;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::json::{extract_json, preview};
use super::Node;
use crate::capability::{Capabilities, CompletionRequest, Purpose};
use crate::error::{CapabilityError, NodeExecutionError};
use crate::plan::{DependencyRef, TaskDraft, TaskId, TaskStatus, WorkerRole};
use crate::state::JobState;

lazy_static! {
    /// `- architect: design the schema`, `2. frontend: build the UI`
    static ref ROLE_LINE: Regex = Regex::new(r"^\s*(?:[-*]|\d+[.)])?\s*([A-Za-z_ -]+?)\s*:\s*(.+?)\s*$")
        .expect("ROLE_LINE is valid");
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanUpdate {
    /// New tasks to append.
    #[serde(default)]
    pub drafts: Vec<TaskDraft>,
    /// Failed tasks to send back to pending.
    #[serde(default)]
    pub reissue: Vec<TaskId>,
}

#[derive(Debug, Deserialize)]
struct PlannerResponse {
    #[serde(default)]
    tasks: Vec<PlannedTask>,
    #[serde(default)]
    reissue: Vec<TaskId>,
}

#[derive(Debug, Deserialize)]
struct PlannedTask {
    #[serde(default)]
    key: Option<String>,
    role: String,
    goal: String,
    #[serde(default)]
    depends_on: Vec<Value>,
}

/// Turns the clarified request, retrieved context and any test feedback into
/// task drafts.
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "key": { "type": "string" },
                            "role": { "type": "string" },
                            "goal": { "type": "string" },
                            "depends_on": { "type": "array" }
                        },
                        "required": ["role", "goal"]
                    }
                },
                "reissue": { "type": "array", "items": { "type": "integer" } }
            },
            "required": ["tasks"]
        })
    }

    fn prompt(state: &JobState, hint: Option<&str>) -> String {
        let mut prompt = String::from(
            "You are the planning manager of a team of specialist workers \
             (architect, code-builder, database, frontend, test-writer, deployment).\n\
             Break the request into tasks. Give each new task a short unique key; \
             depends_on may list keys of new tasks or numeric ids of existing tasks.\n\
             reissue may list ids of failed tasks that should be retried as they are.\n\n",
        );

        prompt.push_str("Request:\n");
        prompt.push_str(&state.request_text());
        prompt.push('\n');

        if !state.context.is_empty() {
            prompt.push_str("\nRelevant context:\n");
            for snippet in &state.context {
                prompt.push_str("- ");
                prompt.push_str(&preview(&snippet.content, 500));
                prompt.push('\n');
            }
        }

        if !state.plan.is_empty() {
            prompt.push_str("\nExisting tasks:\n");
            for task in state.plan.tasks() {
                prompt.push_str(&format!(
                    "- #{} [{}] {:?}: {}\n",
                    task.id, task.role, task.status, task.goal
                ));
                if task.status == TaskStatus::Completed {
                    if let Some(result) = &task.result {
                        prompt.push_str(&format!("  result: {}\n", preview(result, 300)));
                    }
                }
            }
        }

        if let Some(feedback) = state.planning_feedback.last() {
            prompt.push_str("\nThe previous attempt failed testing. Fix what the report describes:\n");
            prompt.push_str(feedback);
            prompt.push('\n');
        }

        if let Some(hint) = hint {
            prompt.push_str("\nYour previous answer was rejected: ");
            prompt.push_str(hint);
            prompt.push_str("\nReturn a corrected plan.\n");
        }

        prompt.push_str("\nRespond with JSON only.");
        prompt
    }

    /// Run the planner, optionally with a hint describing why the previous
    /// answer could not be applied.
    pub async fn plan(
        &self,
        state: &JobState,
        caps: &Capabilities,
        hint: Option<&str>,
    ) -> Result<PlanUpdate, NodeExecutionError> {
        let request =
            CompletionRequest::structured(Purpose::Plan, Self::prompt(state, hint), Self::schema());
        let raw = caps
            .complete(request)
            .await
            .map_err(|e| NodeExecutionError::new(self.role(), e))?;

        let update = Self::parse(&raw).map_err(|e| NodeExecutionError::new(self.role(), e))?;
        tracing::info!(
            target: "taskweave.nodes",
            job_id = %state.job_id,
            drafts = update.drafts.len(),
            reissue = update.reissue.len(),
            "planner produced update"
        );
        Ok(update)
    }

    /// JSON response first; a plain `role: goal` list is accepted as a fallback.
    pub fn parse(raw: &str) -> Result<PlanUpdate, CapabilityError> {
        if let Some(value) = extract_json(raw) {
            let response: PlannerResponse = serde_json::from_value(value)
                .map_err(|e| CapabilityError::InvalidResponse(e.to_string()))?;
            return Ok(Self::build_update(response));
        }

        let drafts: Vec<TaskDraft> = raw
            .lines()
            .filter_map(|line| ROLE_LINE.captures(line))
            .filter_map(|cap| {
                let role = cap.get(1)?.as_str().parse::<WorkerRole>().ok()?;
                Some(TaskDraft::new(role, cap.get(2)?.as_str()))
            })
            .collect();

        if drafts.is_empty() {
            return Err(CapabilityError::InvalidResponse(format!(
                "planner output has neither JSON nor role lines: {}",
                preview(raw, 200)
            )));
        }
        Ok(PlanUpdate {
            drafts,
            reissue: Vec::new(),
        })
    }

    fn build_update(response: PlannerResponse) -> PlanUpdate {
        let keys: HashSet<String> = response
            .tasks
            .iter()
            .filter_map(|t| t.key.as_ref().map(|k| k.trim().to_string()))
            .collect();

        let drafts = response
            .tasks
            .into_iter()
            .map(|task| {
                let depends_on = task
                    .depends_on
                    .iter()
                    .filter_map(|dep| match dep {
                        Value::Number(n) => n.as_u64().map(DependencyRef::Existing),
                        // Keys of this batch win over numeric-looking ids.
                        Value::String(s) if keys.contains(s.trim()) => {
                            Some(DependencyRef::Key(s.trim().to_string()))
                        }
                        Value::String(s) => Some(DependencyRef::parse(s)),
                        _ => None,
                    })
                    .collect();
                TaskDraft {
                    key: task.key.map(|k| k.trim().to_string()),
                    role: WorkerRole::parse_lenient(&task.role),
                    goal: task.goal,
                    depends_on,
                }
            })
            .collect();

        PlanUpdate {
            drafts,
            reissue: response.reissue,
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for Planner {
    type Update = PlanUpdate;

    fn role(&self) -> &'static str {
        "planner"
    }

    async fn run(
        &self,
        state: &JobState,
        caps: &Capabilities,
    ) -> Result<PlanUpdate, NodeExecutionError> {
        self.plan(state, caps, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_json_plan_with_keys_and_ids() {
        let raw = r##"```json
        {"tasks": [
            {"key": "1", "role": "Architect", "goal": "design"},
            {"key": "api", "role": "backend", "goal": "build api", "depends_on": ["1", 7]},
            {"role": "unknown-thing", "goal": "misc", "depends_on": ["#3"]}
        ], "reissue": [4]}
        ```"##;

        let update = Planner::parse(raw).unwrap();
        assert_eq!(update.reissue, vec![4]);
        assert_eq!(update.drafts.len(), 3);
        assert_eq!(update.drafts[0].role, WorkerRole::Architect);
        assert_eq!(update.drafts[1].role, WorkerRole::CodeBuilder);
        assert_eq!(
            update.drafts[1].depends_on,
            vec![DependencyRef::Key("1".into()), DependencyRef::Existing(7)]
        );
        assert_eq!(update.drafts[2].role, WorkerRole::Generalist);
        assert_eq!(update.drafts[2].depends_on, vec![DependencyRef::Existing(3)]);
    }

    #[test]
    fn test_parse_role_lines_fallback() {
        let raw = "Plan:\n- architect: design the schema\n2. frontend: build the UI\nthanks";
        let update = Planner::parse(raw).unwrap();
        let goals: Vec<(WorkerRole, &str)> = update
            .drafts
            .iter()
            .map(|d| (d.role, d.goal.as_str()))
            .collect();
        assert_eq!(
            goals,
            vec![
                (WorkerRole::Architect, "design the schema"),
                (WorkerRole::Frontend, "build the UI"),
            ]
        );
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        let err = Planner::parse("I cannot help with that").unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidResponse(_)));
    }

    #[test]
    fn test_prompt_carries_feedback_and_hint() {
        let mut state = JobState::new("job-1", "u1", "build a shop");
        state.planning_feedback.push("checkout endpoint missing".into());
        let prompt = Planner::prompt(&state, Some("circular dependency detected: 1 -> 2 -> 1"));
        assert!(prompt.contains("checkout endpoint missing"));
        assert!(prompt.contains("circular dependency"));
    }
}
