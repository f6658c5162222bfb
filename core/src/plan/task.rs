use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

pub type TaskId = u64;

/// Worker capability tag carried by every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerRole {
    Architect,
    CodeBuilder,
    Database,
    Frontend,
    TestWriter,
    Deployment,
    Generalist,
}

impl WorkerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::CodeBuilder => "code-builder",
            Self::Database => "database",
            Self::Frontend => "frontend",
            Self::TestWriter => "test-writer",
            Self::Deployment => "deployment",
            Self::Generalist => "generalist",
        }
    }

    /// Lenient parse used on planner output; unknown tags become `Generalist`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Generalist)
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        let normalized = normalized.trim_end_matches("-worker");
        match normalized {
            "architect" => Ok(Self::Architect),
            "code-builder" | "coder" | "developer" | "backend" => Ok(Self::CodeBuilder),
            "database" | "db" => Ok(Self::Database),
            "frontend" | "ui" => Ok(Self::Frontend),
            "test-writer" | "tester" | "qa" => Ok(Self::TestWriter),
            "deployment" | "devops" | "deploy" => Ok(Self::Deployment),
            "generalist" | "general" => Ok(Self::Generalist),
            other => Err(format!("unknown worker role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    /// Legal edges of the task lifecycle. Statuses only move forward, except
    /// interrupt-driven cancellation and the self-correction re-issue of a
    /// failed task.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
                | (TaskStatus::InProgress, TaskStatus::Cancelled)
                | (TaskStatus::Failed, TaskStatus::Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }

    /// Pending or in progress.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfValidationStatus {
    Passed,
    Failed,
}

/// A unit of work in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub role: WorkerRole,
    pub goal: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: BTreeSet<TaskId>,
    /// Produced artifact, only present once the task is completed.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub generated_tests: Option<Vec<String>>,
    #[serde(default)]
    pub self_validation_status: Option<SelfValidationStatus>,
    #[serde(default)]
    pub repair_attempts: u32,
    /// Why the task ended failed or cancelled.
    #[serde(default)]
    pub note: Option<String>,
    /// Set when the task was cancelled only because this dependency never
    /// completed. Such a task comes back once the dependency is re-issued.
    #[serde(default)]
    pub blocked_by: Option<TaskId>,
}

impl Task {
    pub fn new(id: TaskId, role: WorkerRole, goal: impl Into<String>) -> Self {
        Self {
            id,
            role,
            goal: goal.into(),
            status: TaskStatus::Pending,
            dependencies: BTreeSet::new(),
            result: None,
            generated_tests: None,
            self_validation_status: None,
            repair_attempts: 0,
            note: None,
            blocked_by: None,
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies = deps.into_iter().collect();
        self
    }

    /// Move to `to`, enforcing the lifecycle. Cancelling a cancelled task is a no-op.
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), PlanError> {
        if self.status == TaskStatus::Cancelled && to == TaskStatus::Cancelled {
            return Ok(());
        }
        if !self.status.can_transition_to(to) {
            return Err(PlanError::InvalidTransition {
                task_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to != TaskStatus::Completed {
            self.result = None;
        }
        Ok(())
    }

    /// `cancelled -> pending`, allowed only for a task cancelled because a
    /// dependency did not complete.
    pub fn revive(&mut self) -> Result<(), PlanError> {
        if self.status != TaskStatus::Cancelled || self.blocked_by.is_none() {
            return Err(PlanError::InvalidTransition {
                task_id: self.id,
                from: self.status,
                to: TaskStatus::Pending,
            });
        }
        self.status = TaskStatus::Pending;
        self.blocked_by = None;
        self.note = None;
        Ok(())
    }
}

/// Reference to a dependency inside a [`TaskDraft`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
    /// An existing task in the plan.
    Existing(TaskId),
    /// The `key` of another draft in the same batch.
    Key(String),
}

impl DependencyRef {
    /// Planner output uses strings for everything; numeric strings name existing ids.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('#');
        match trimmed.parse::<TaskId>() {
            Ok(id) => Self::Existing(id),
            Err(_) => Self::Key(raw.trim().to_string()),
        }
    }
}

/// A task that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub key: Option<String>,
    pub role: WorkerRole,
    pub goal: String,
    #[serde(default)]
    pub depends_on: Vec<DependencyRef>,
}

impl TaskDraft {
    pub fn new(role: WorkerRole, goal: impl Into<String>) -> Self {
        Self {
            key: None,
            role,
            goal: goal.into(),
            depends_on: Vec::new(),
        }
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn after(mut self, dep: DependencyRef) -> Self {
        self.depends_on.push(dep);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_lenient() {
        assert_eq!("Code_Builder".parse::<WorkerRole>(), Ok(WorkerRole::CodeBuilder));
        assert_eq!(WorkerRole::parse_lenient("FrontendWorker"), WorkerRole::Generalist);
        assert_eq!(WorkerRole::parse_lenient("frontend-worker"), WorkerRole::Frontend);
        assert_eq!(WorkerRole::parse_lenient("backend"), WorkerRole::CodeBuilder);
        assert_eq!(WorkerRole::parse_lenient("astrologer"), WorkerRole::Generalist);
    }

    #[test]
    fn test_valid_transitions() {
        let mut task = Task::new(1, WorkerRole::CodeBuilder, "build");
        assert!(task.transition(TaskStatus::InProgress).is_ok());
        assert!(task.transition(TaskStatus::Failed).is_ok());
        assert!(task.transition(TaskStatus::Pending).is_ok());
        assert!(task.transition(TaskStatus::Cancelled).is_ok());
        assert!(task.transition(TaskStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_revive_requires_blocked_cancellation() {
        let mut task = Task::new(2, WorkerRole::Frontend, "ui");
        task.transition(TaskStatus::Cancelled).unwrap();
        assert!(task.revive().is_err());

        task.blocked_by = Some(1);
        task.revive().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.blocked_by, None);
    }

    #[test]
    fn test_completed_is_final() {
        let mut task = Task::new(1, WorkerRole::CodeBuilder, "build");
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Completed).unwrap();

        let err = task.transition(TaskStatus::Cancelled).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { task_id: 1, .. }));
        assert!(task.transition(TaskStatus::Pending).is_err());
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut task = Task::new(7, WorkerRole::Database, "schema");
        assert!(task.transition(TaskStatus::Completed).is_err());
    }

    #[test]
    fn test_dependency_ref_parse() {
        assert_eq!(DependencyRef::parse("3"), DependencyRef::Existing(3));
        assert_eq!(DependencyRef::parse("#12"), DependencyRef::Existing(12));
        assert_eq!(
            DependencyRef::parse(" schema "),
            DependencyRef::Key("schema".to_string())
        );
    }
}
