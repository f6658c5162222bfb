use thiserror::Error;

use crate::plan::{TaskId, TaskStatus};

/// Plan integrity violations. Any of these rejects the mutation that caused it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(TaskId),

    #[error("dependency not found: task {task_id} depends on {missing_dep}")]
    DependencyNotFound { task_id: TaskId, missing_dep: TaskId },

    #[error("task {0} depends on itself")]
    SelfDependency(TaskId),

    #[error("circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("unknown dependency reference '{reference}' in task '{task}'")]
    UnresolvedReference { task: String, reference: String },

    #[error("invalid transition for task {task_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("planner produced an unusable plan: {0}")]
    Malformed(String),
}
