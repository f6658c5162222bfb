//! HTTP request and response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use taskweave_core::api::{ErrorCode, JobError, JobId};

// ============= Jobs =============

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub request: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub success: bool,
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct InterruptRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ClarificationRequest {
    pub answers: Vec<String>,
}

/// Envelope for job payloads (`JobState`, `InterruptReport`, ...).
#[derive(Debug, Serialize)]
pub struct JobResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> JobResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub success: bool,
    pub jobs: Vec<JobId>,
}

// ============= Health =============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_id: String,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
    pub jobs_submitted: u64,
    pub timestamp: String,
}

// ============= Error Handling =============

#[derive(Debug)]
pub enum HttpServerError {
    InvalidRequest(String),
    Job(JobError),
    Internal(String),
}

impl HttpServerError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            Self::Job(err) => {
                let code = err.error_code();
                let status = match code {
                    ErrorCode::NotFound => StatusCode::NOT_FOUND,
                    ErrorCode::InvalidState => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, code.as_str())
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<JobError> for HttpServerError {
    fn from(err: JobError) -> Self {
        Self::Job(err)
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = match self {
            Self::InvalidRequest(msg) | Self::Internal(msg) => msg,
            Self::Job(err) => err.to_string(),
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}
