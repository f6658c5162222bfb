use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::json::extract_json;
use super::Node;
use crate::capability::{Capabilities, CompletionRequest, Purpose};
use crate::error::NodeExecutionError;
use crate::state::{JobState, ValidationReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestUpdate {
    pub report: ValidationReport,
}

/// Holistic check of the aggregated deliverable against the request.
pub struct Tester;

impl Tester {
    pub fn new() -> Self {
        Self
    }

    /// `{"status": "Passed"|"Failed", "details": "..."}`. Anything else is a
    /// failed report carrying the raw output.
    pub fn parse_report(raw: &str) -> ValidationReport {
        let Some(value) = extract_json(raw) else {
            return ValidationReport::failed(raw.trim());
        };

        let details = value
            .get("details")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let passed = match value.get("status") {
            Some(Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "passed" | "pass")
            }
            Some(Value::Bool(b)) => *b,
            _ => return ValidationReport::failed(raw.trim()),
        };

        if passed {
            ValidationReport::passed(details)
        } else {
            ValidationReport::failed(details)
        }
    }
}

impl Default for Tester {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for Tester {
    type Update = TestUpdate;

    fn role(&self) -> &'static str {
        "tester"
    }

    async fn run(
        &self,
        state: &JobState,
        caps: &Capabilities,
    ) -> Result<TestUpdate, NodeExecutionError> {
        let deliverable = match state.final_deliverable.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => {
                return Ok(TestUpdate {
                    report: ValidationReport::failed("no deliverable was produced"),
                })
            }
        };

        let prompt = format!(
            "You are the QA lead. Decide whether the deliverable fully satisfies the request.\n\
             Request:\n{}\n\nDeliverable:\n{}\n\n\
             Respond with JSON: {{\"status\": \"Passed\" or \"Failed\", \"details\": \"...\"}}",
            state.request_text(),
            deliverable
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["Passed", "Failed"] },
                "details": { "type": "string" }
            },
            "required": ["status"]
        });

        let raw = caps
            .complete(CompletionRequest::structured(Purpose::Test, prompt, schema))
            .await
            .map_err(|e| NodeExecutionError::new(self.role(), e))?;
        let report = Self::parse_report(&raw);

        tracing::info!(
            target: "taskweave.nodes",
            job_id = %state.job_id,
            status = ?report.status,
            "tester finished"
        );
        Ok(TestUpdate { report })
    }
}
