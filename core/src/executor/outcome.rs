use serde::{Deserialize, Serialize};

use crate::plan::{TaskId, TaskStatus};
use crate::state::{JobState, JobStatus, ValidationReport};

/// What a caller gets back when a job stops running, for good or for now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded {
        deliverable: String,
    },
    AwaitingClarification {
        questions: Vec<String>,
    },
    Failed {
        reason: String,
        #[serde(default)]
        report: Option<ValidationReport>,
        #[serde(default)]
        failed_tasks: Vec<TaskId>,
        #[serde(default)]
        cancelled_tasks: Vec<TaskId>,
    },
}

impl JobOutcome {
    /// Outcome implied by a stored state; `None` while the job is running.
    pub fn from_state(state: &JobState) -> Option<Self> {
        match state.status {
            JobStatus::Running => None,
            JobStatus::Succeeded => Some(Self::Succeeded {
                deliverable: state.final_deliverable.clone().unwrap_or_default(),
            }),
            JobStatus::AwaitingClarification => Some(Self::AwaitingClarification {
                questions: state.clarification.questions.clone(),
            }),
            JobStatus::Failed => {
                let failure = state.failure.clone();
                Some(Self::Failed {
                    reason: failure
                        .as_ref()
                        .map(|f| f.reason.clone())
                        .unwrap_or_else(|| "job failed".into()),
                    report: failure
                        .as_ref()
                        .and_then(|f| f.report.clone())
                        .or_else(|| state.validation_report.clone()),
                    failed_tasks: state.plan.ids_with_status(TaskStatus::Failed),
                    cancelled_tasks: state.plan.ids_with_status(TaskStatus::Cancelled),
                })
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}
