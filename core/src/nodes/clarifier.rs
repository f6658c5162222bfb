use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::json::parse_json;
use super::Node;
use crate::capability::{Capabilities, CompletionRequest, Purpose};
use crate::error::NodeExecutionError;
use crate::state::JobState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarifyUpdate {
    pub needs_clarification: bool,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub clarified_request: Option<String>,
}

/// Decides whether the request is specific enough to plan against.
pub struct Clarifier {
    max_rounds: u32,
}

impl Clarifier {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "needs_clarification": { "type": "boolean" },
                "questions": { "type": "array", "items": { "type": "string" } },
                "clarified_request": { "type": "string" }
            },
            "required": ["needs_clarification"]
        })
    }

    fn prompt(state: &JobState) -> String {
        let mut prompt = String::from(
            "You review software build requests before planning.\n\
             If the request is too ambiguous to plan, set needs_clarification \
             and list the questions to ask. Otherwise restate the request as a \
             complete, self-contained clarified_request.\n\n",
        );
        prompt.push_str("Request:\n");
        prompt.push_str(&state.request_text());
        if !state.clarification.answers.is_empty() {
            prompt.push_str("\n\nAnswers already given:\n");
            for answer in &state.clarification.answers {
                prompt.push_str("- ");
                prompt.push_str(answer);
                prompt.push('\n');
            }
        }
        prompt.push_str("\n\nRespond with JSON only.");
        prompt
    }

    /// Request text with the answers folded in, used when the model does not
    /// restate the request itself.
    fn fold_answers(state: &JobState) -> String {
        let mut text = state.original_request.clone();
        if !state.clarification.answers.is_empty() {
            text.push_str("\n\nClarifications:");
            for answer in &state.clarification.answers {
                text.push_str("\n- ");
                text.push_str(answer);
            }
        }
        text
    }
}

#[async_trait]
impl Node for Clarifier {
    type Update = ClarifyUpdate;

    fn role(&self) -> &'static str {
        "clarifier"
    }

    async fn run(
        &self,
        state: &JobState,
        caps: &Capabilities,
    ) -> Result<ClarifyUpdate, NodeExecutionError> {
        if state.clarification.rounds >= self.max_rounds {
            tracing::info!(
                target: "taskweave.nodes",
                job_id = %state.job_id,
                rounds = state.clarification.rounds,
                "clarification rounds exhausted, proceeding with request as is"
            );
            return Ok(ClarifyUpdate {
                needs_clarification: false,
                questions: Vec::new(),
                clarified_request: Some(Self::fold_answers(state)),
            });
        }

        let request =
            CompletionRequest::structured(Purpose::Clarify, Self::prompt(state), Self::schema());
        let raw = caps
            .complete(request)
            .await
            .map_err(|e| NodeExecutionError::new(self.role(), e))?;
        let mut update: ClarifyUpdate =
            parse_json(&raw).map_err(|e| NodeExecutionError::new(self.role(), e))?;

        update.questions.retain(|q| !q.trim().is_empty());
        if update.needs_clarification && update.questions.is_empty() {
            // Nothing to ask; a pause without questions is not allowed.
            update.needs_clarification = false;
        }
        if !update.needs_clarification {
            update.questions.clear();
            let restated = update
                .clarified_request
                .take()
                .filter(|s| !s.trim().is_empty());
            update.clarified_request = Some(restated.unwrap_or_else(|| Self::fold_answers(state)));
        }

        tracing::debug!(
            target: "taskweave.nodes",
            job_id = %state.job_id,
            needs_clarification = update.needs_clarification,
            questions = update.questions.len(),
            "clarifier finished"
        );
        Ok(update)
    }
}
