use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::edit::PlanEdit;
use crate::capability::{Capabilities, CompletionRequest, Purpose};
use crate::error::{CapabilityError, NodeExecutionError};
use crate::nodes::json::{parse_json, preview};
use crate::plan::{TaskId, WorkerRole};
use crate::state::JobState;

/// Result of impact analysis: a human-readable summary and ordered edits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub summary: String,
    pub edits: Vec<PlanEdit>,
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    edits: Vec<RawEdit>,
}

#[derive(Debug, Deserialize)]
struct RawEdit {
    action: String,
    #[serde(default)]
    task_id: Option<TaskId>,
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default, alias = "depends_on")]
    dependencies: Vec<TaskId>,
}

impl RawEdit {
    fn into_edit(self) -> Result<PlanEdit, CapabilityError> {
        let missing = |field: &str| {
            CapabilityError::InvalidResponse(format!("{} edit without {field}", self.action))
        };
        match self.action.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(PlanEdit::Cancel {
                task_id: self.task_id.ok_or_else(|| missing("task_id"))?,
            }),
            "modify" => Ok(PlanEdit::Modify {
                task_id: self.task_id.ok_or_else(|| missing("task_id"))?,
                goal: self.goal.clone().ok_or_else(|| missing("goal"))?,
            }),
            "add" => Ok(PlanEdit::Add {
                role: WorkerRole::parse_lenient(self.role.as_deref().unwrap_or_default()),
                goal: self.goal.clone().ok_or_else(|| missing("goal"))?,
                dependencies: self.dependencies.clone(),
            }),
            other => Err(CapabilityError::InvalidResponse(format!(
                "unknown edit action '{other}'"
            ))),
        }
    }
}

/// Asks the reasoning capability how a new user message changes the live plan.
pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "action": { "type": "string", "enum": ["cancel", "modify", "add"] },
                            "task_id": { "type": "integer" },
                            "goal": { "type": "string" },
                            "role": { "type": "string" },
                            "dependencies": { "type": "array", "items": { "type": "integer" } }
                        },
                        "required": ["action"]
                    }
                }
            },
            "required": ["summary", "edits"]
        })
    }

    fn prompt(state: &JobState, message: &str, hint: Option<&str>) -> String {
        let plan = serde_json::to_string_pretty(state.plan.tasks()).unwrap_or_default();
        let mut prompt = format!(
            "A user interrupted a running build with a new message. Work out how it \
             changes the current plan.\n\
             Use `cancel` for tasks no longer wanted, `modify` to change a task's goal, \
             and `add` for new work (dependencies are existing task ids).\n\n\
             Request:\n{}\n\nCurrent plan:\n{}\n\nNew message:\n{}\n",
            state.request_text(),
            plan,
            message
        );
        if let Some(hint) = hint {
            prompt.push_str("\nYour previous edits were rejected: ");
            prompt.push_str(hint);
            prompt.push('\n');
        }
        prompt.push_str("\nRespond with JSON: {\"summary\": \"...\", \"edits\": [...]}");
        prompt
    }

    pub async fn analyze(
        &self,
        state: &JobState,
        message: &str,
        caps: &Capabilities,
        hint: Option<&str>,
    ) -> Result<ImpactAnalysis, NodeExecutionError> {
        let request = CompletionRequest::structured(
            Purpose::ImpactAnalysis,
            Self::prompt(state, message, hint),
            Self::schema(),
        );
        let raw = caps
            .complete(request)
            .await
            .map_err(|e| NodeExecutionError::new("impact-analyzer", e))?;
        Self::parse(&raw).map_err(|e| NodeExecutionError::new("impact-analyzer", e))
    }

    pub fn parse(raw: &str) -> Result<ImpactAnalysis, CapabilityError> {
        let parsed: RawAnalysis = parse_json(raw)?;
        let edits = parsed
            .edits
            .into_iter()
            .map(RawEdit::into_edit)
            .collect::<Result<Vec<_>, _>>()?;
        let summary = if parsed.summary.trim().is_empty() {
            format!("{} edit(s) proposed", edits.len())
        } else {
            preview(parsed.summary.trim(), 1_000)
        };
        Ok(ImpactAnalysis { summary, edits })
    }
}

impl Default for ImpactAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
