use thiserror::Error;

use super::capability::NodeExecutionError;
use super::error::StoreError;
use super::plan::PlanError;
use crate::state::Stage;

/// Stable error codes surfaced to callers of the job control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    TransientCapability,
    TaskValidationFailure,
    PlanIntegrity,
    JobFatal,
    NotFound,
    InvalidState,
    Storage,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientCapability => "TRANSIENT_CAPABILITY_ERROR",
            Self::TaskValidationFailure => "TASK_VALIDATION_FAILURE",
            Self::PlanIntegrity => "PLAN_INTEGRITY_ERROR",
            Self::JobFatal => "JOB_FATAL_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::Storage => "STORAGE_ERROR",
        }
    }
}

/// Errors raised while driving a job through the stage graph.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("transient capability error: {0}")]
    TransientCapability(NodeExecutionError),

    #[error("task {task_id} failed self-validation: {details}")]
    TaskValidationFailure { task_id: u64, details: String },

    #[error("plan integrity error: {0}")]
    PlanIntegrity(#[from] PlanError),

    #[error("job failed: {reason}")]
    JobFatal { reason: String },

    #[error("invalid stage transition {from:?} -> {to:?}")]
    InvalidStageTransition { from: Stage, to: Stage },

    #[error("checkpoint failed: {0}")]
    Store(#[from] StoreError),
}

impl ExecutorError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::JobFatal {
            reason: reason.into(),
        }
    }

    /// Map executor error to a protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::TransientCapability(_) => ErrorCode::TransientCapability,
            Self::TaskValidationFailure { .. } => ErrorCode::TaskValidationFailure,
            Self::PlanIntegrity(_) => ErrorCode::PlanIntegrity,
            Self::JobFatal { .. } => ErrorCode::JobFatal,
            Self::InvalidStageTransition { .. } => ErrorCode::JobFatal,
            Self::Store(_) => ErrorCode::Storage,
        }
    }
}

impl From<NodeExecutionError> for ExecutorError {
    fn from(err: NodeExecutionError) -> Self {
        if err.cause.is_transient() {
            Self::TransientCapability(err)
        } else {
            Self::JobFatal {
                reason: err.to_string(),
            }
        }
    }
}
