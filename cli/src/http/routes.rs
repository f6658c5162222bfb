//! Job control routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use taskweave_core::api::{InterruptReport, JobState};

use super::models::*;
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(submit_handler).get(list_handler))
        .route("/api/v1/jobs/:id", get(status_handler))
        .route("/api/v1/jobs/:id/interrupt", post(interrupt_handler))
        .route("/api/v1/jobs/:id/clarification", post(clarification_handler))
        .route("/api/v1/jobs/:id/resume", post(resume_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .with_state(state)
}

/// POST /api/v1/jobs
async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), HttpServerError> {
    state.record_request("/api/v1/jobs");

    if req.request.trim().is_empty() {
        state.record_error();
        return Err(HttpServerError::InvalidRequest(
            "Request text cannot be empty".to_string(),
        ));
    }
    if req.user_id.trim().is_empty() {
        state.record_error();
        return Err(HttpServerError::InvalidRequest(
            "User ID cannot be empty".to_string(),
        ));
    }

    let job_id = state
        .controller
        .submit(req.request, req.user_id)
        .await
        .map_err(|e| failed(&state, e))?;

    if let Ok(mut stats) = state.stats.write() {
        stats.jobs_submitted += 1;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            success: true,
            job_id,
        }),
    ))
}

/// GET /api/v1/jobs
async fn list_handler(
    State(state): State<AppState>,
) -> Result<Json<JobListResponse>, HttpServerError> {
    state.record_request("/api/v1/jobs");
    let jobs = state
        .controller
        .list_jobs()
        .await
        .map_err(|e| failed(&state, e))?;
    Ok(Json(JobListResponse {
        success: true,
        jobs,
    }))
}

/// GET /api/v1/jobs/:id
async fn status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse<JobState>>, HttpServerError> {
    state.record_request("/api/v1/jobs/:id");
    let snapshot = state
        .controller
        .get_status(&job_id)
        .await
        .map_err(|e| failed(&state, e))?;
    Ok(Json(JobResponse::ok(snapshot)))
}

/// POST /api/v1/jobs/:id/interrupt
async fn interrupt_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<InterruptRequest>,
) -> Result<Json<JobResponse<InterruptReport>>, HttpServerError> {
    state.record_request("/api/v1/jobs/:id/interrupt");
    if req.message.trim().is_empty() {
        state.record_error();
        return Err(HttpServerError::InvalidRequest(
            "Interrupt message cannot be empty".to_string(),
        ));
    }
    let report = state
        .controller
        .interrupt(&job_id, req.message)
        .await
        .map_err(|e| failed(&state, e))?;
    Ok(Json(JobResponse::ok(report)))
}

/// POST /api/v1/jobs/:id/clarification
async fn clarification_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(req): Json<ClarificationRequest>,
) -> Result<Json<JobResponse<JobState>>, HttpServerError> {
    state.record_request("/api/v1/jobs/:id/clarification");
    state
        .controller
        .answer_clarification(&job_id, req.answers)
        .await
        .map_err(|e| failed(&state, e))?;
    let snapshot = state
        .controller
        .get_status(&job_id)
        .await
        .map_err(|e| failed(&state, e))?;
    Ok(Json(JobResponse::ok(snapshot)))
}

/// POST /api/v1/jobs/:id/resume
async fn resume_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse<JobState>>, HttpServerError> {
    state.record_request("/api/v1/jobs/:id/resume");
    let snapshot = state
        .controller
        .resume(&job_id)
        .await
        .map_err(|e| failed(&state, e))?;
    Ok(Json(JobResponse::ok(snapshot)))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (uptime_seconds, requests_handled, jobs_submitted) = match state.stats.read() {
        Ok(stats) => (
            stats.uptime_seconds(),
            stats.requests_total,
            stats.jobs_submitted,
        ),
        Err(_) => (0.0, 0, 0),
    };

    Json(HealthResponse {
        status: "healthy".into(),
        session_id: state.session_id.clone(),
        uptime_seconds,
        requests_handled,
        jobs_submitted,
        timestamp: Local::now().to_rfc3339(),
    })
}

/// POST /api/v1/shutdown
async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let _ = state.shutdown_tx.send(());

    Json(serde_json::json!({
        "success": true,
        "message": "Shutdown signal sent"
    }))
}

fn failed(state: &AppState, err: taskweave_core::api::JobError) -> HttpServerError {
    state.record_error();
    tracing::warn!(target: "taskweave.http", error = %err, "job request failed");
    HttpServerError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use taskweave_core::api::{AppConfig, ExecutorSettings, JobController, MemoryJobStore};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn app() -> Router {
        let cfg = AppConfig::default();
        let caps = taskweave_plugins::factory::build_capabilities(&cfg).unwrap();
        let controller = JobController::new(
            caps,
            ExecutorSettings::from_config(&cfg),
            Arc::new(MemoryJobStore::new()),
        );
        let (shutdown_tx, _) = broadcast::channel(1);
        create_router(AppState::new("test-session".into(), controller, shutdown_tx))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["session_id"], "test-session");
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let req = Request::builder()
            .uri("/api/v1/jobs/nope")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_blank_request_rejected() {
        let req = post_json(
            "/api/v1/jobs",
            serde_json::json!({"request": "  ", "user_id": "alice"}),
        );
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_answer_unknown_job_is_404() {
        let req = post_json(
            "/api/v1/jobs/nope/clarification",
            serde_json::json!({"answers": ["postgres"]}),
        );
        let (status, _) = send(app(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let req = Request::builder()
            .uri("/api/v1/jobs")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobs"], serde_json::json!([]));
    }
}
