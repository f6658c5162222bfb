//! Job state and the records hanging off it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::ContextSnippet;
use crate::plan::{Plan, Task, TaskId, TaskStatus, WorkerRole};

pub type JobId = String;

/// Workflow stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Clarify,
    Retrieve,
    Plan,
    EstimateCost,
    Execute,
    Aggregate,
    Test,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clarify => "clarify",
            Self::Retrieve => "retrieve",
            Self::Plan => "plan",
            Self::EstimateCost => "estimate_cost",
            Self::Execute => "execute",
            Self::Aggregate => "aggregate",
            Self::Test => "test",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stages before a plan exists; interrupts here amend the request instead.
    pub fn precedes_plan(self) -> bool {
        matches!(self, Self::Clarify | Self::Retrieve)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    AwaitingClarification,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::AwaitingClarification => "awaiting_clarification",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// Outcome of one tester invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub details: String,
}

impl ValidationReport {
    pub fn passed(details: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Passed,
            details: details.into(),
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Failed,
            details: details.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostCounters {
    /// Estimate produced by the resource monitor for the current plan.
    pub estimated: f64,
    /// Accumulated cost of tasks that actually ran.
    pub current: f64,
}

/// Clarification exchange with the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clarification {
    /// Questions currently awaiting an answer.
    #[serde(default)]
    pub questions: Vec<String>,
    /// Answers received so far, in order.
    #[serde(default)]
    pub answers: Vec<String>,
    /// Number of answered rounds.
    #[serde(default)]
    pub rounds: u32,
}

/// Why a job ended in failure, kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub reason: String,
    pub code: String,
    #[serde(default)]
    pub report: Option<ValidationReport>,
    #[serde(default)]
    pub failed_tasks: Vec<TaskId>,
    #[serde(default)]
    pub cancelled_tasks: Vec<TaskId>,
}

/// Full workflow context for one job. Owned by a single executor while the
/// job runs; everything else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: JobId,
    pub user_id: String,
    pub original_request: String,
    #[serde(default)]
    pub clarified_request: Option<String>,
    /// Instructions added by interrupts before a plan existed.
    #[serde(default)]
    pub amendments: Vec<String>,
    #[serde(default)]
    pub clarification: Clarification,
    #[serde(default)]
    pub context: Vec<ContextSnippet>,
    #[serde(default)]
    pub plan: Plan,
    /// Completed tasks by id, append-only except for interrupt edits.
    #[serde(default)]
    pub completed: BTreeMap<TaskId, Task>,
    #[serde(default)]
    pub final_deliverable: Option<String>,
    #[serde(default)]
    pub excluded_tasks: Vec<TaskId>,
    #[serde(default)]
    pub validation_report: Option<ValidationReport>,
    #[serde(default)]
    pub validation_history: Vec<ValidationReport>,
    /// Extra context for the next planner run (test failures, error hints).
    #[serde(default)]
    pub planning_feedback: Vec<String>,
    #[serde(default)]
    pub self_corrections: u32,
    #[serde(default)]
    pub costs: CostCounters,
    pub stage: Stage,
    pub status: JobStatus,
    #[serde(default)]
    pub failure: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    pub fn new(job_id: impl Into<JobId>, user_id: impl Into<String>, request: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            user_id: user_id.into(),
            original_request: request.into(),
            clarified_request: None,
            amendments: Vec::new(),
            clarification: Clarification::default(),
            context: Vec::new(),
            plan: Plan::new(),
            completed: BTreeMap::new(),
            final_deliverable: None,
            excluded_tasks: Vec::new(),
            validation_report: None,
            validation_history: Vec::new(),
            planning_feedback: Vec::new(),
            self_corrections: 0,
            costs: CostCounters::default(),
            stage: Stage::Clarify,
            status: JobStatus::Running,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Request text handed to downstream nodes: the clarified request (or the
    /// original one) followed by any interrupt amendments.
    pub fn request_text(&self) -> String {
        let base = self
            .clarified_request
            .as_deref()
            .unwrap_or(&self.original_request);
        if self.amendments.is_empty() {
            return base.to_string();
        }
        let mut text = base.to_string();
        text.push_str("\n\nAdditional instructions:");
        for amendment in &self.amendments {
            text.push_str("\n- ");
            text.push_str(amendment);
        }
        text
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn task_ids_with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.plan.ids_with_status(status)
    }
}

/// Job lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Submitted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    StageChanged {
        job_id: JobId,
        from: Stage,
        to: Stage,
        timestamp: DateTime<Utc>,
    },
    TaskDispatched {
        job_id: JobId,
        task_id: TaskId,
        role: WorkerRole,
        timestamp: DateTime<Utc>,
    },
    TaskFinished {
        job_id: JobId,
        task_id: TaskId,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    TaskDiscarded {
        job_id: JobId,
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },
    InterruptApplied {
        job_id: JobId,
        summary: String,
        timestamp: DateTime<Utc>,
    },
    Paused {
        job_id: JobId,
        questions: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Completed {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    Failed {
        job_id: JobId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Submitted { job_id, .. }
            | Self::StageChanged { job_id, .. }
            | Self::TaskDispatched { job_id, .. }
            | Self::TaskFinished { job_id, .. }
            | Self::TaskDiscarded { job_id, .. }
            | Self::InterruptApplied { job_id, .. }
            | Self::Paused { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Submitted { timestamp, .. }
            | Self::StageChanged { timestamp, .. }
            | Self::TaskDispatched { timestamp, .. }
            | Self::TaskFinished { timestamp, .. }
            | Self::TaskDiscarded { timestamp, .. }
            | Self::InterruptApplied { timestamp, .. }
            | Self::Paused { timestamp, .. }
            | Self::Completed { timestamp, .. }
            | Self::Failed { timestamp, .. } => *timestamp,
        }
    }
}
