use thiserror::Error;

use super::executor::ErrorCode;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("job error: {0}")]
    Job(#[from] JobError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Errors returned by the job control surface.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {job_id} cannot {action} while {status}")]
    InvalidState {
        job_id: String,
        action: &'static str,
        status: String,
    },
    #[error("job {0} stopped before replying")]
    Disconnected(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl JobError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidState { .. } | Self::Disconnected(_) => ErrorCode::InvalidState,
            Self::Store(_) => ErrorCode::Storage,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("job record corrupted: {0}")]
    Corrupted(String),
}
