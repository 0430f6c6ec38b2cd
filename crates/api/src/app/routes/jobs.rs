use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use conductor_core::JobId;
use conductor_jobs::{Job, JobKind};

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(enqueue_job))
        .route("/run", post(run_due_jobs))
        .route("/:id", get(get_job))
}

pub async fn enqueue_job(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::EnqueueJobRequest>,
) -> axum::response::Response {
    if body.kind.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "job type must not be empty",
        );
    }

    let mut job = Job::new(JobKind::from(body.kind.as_str()), body.payload);
    if let Some(project_id) = body.project_id {
        job = job.for_project(project_id);
    }
    if let Some(at) = body.scheduled_at {
        job = job.scheduled_at(at);
    }
    if let Some(max_attempts) = body.max_attempts {
        job = job.with_max_attempts(max_attempts);
    }

    match services.jobs.enqueue(job.clone()) {
        Ok(_) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            e.to_string(),
        ),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(id) => id,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "malformed job id")
        }
    };

    match services.jobs.get(job_id) {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            e.to_string(),
        ),
    }
}

/// Drain due jobs. Intended for an external scheduler (e.g. a minutely
/// cron); overlapping invocations are safe because each job is claimed with
/// a conditional write.
pub async fn run_due_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RunJobsRequest>,
) -> axum::response::Response {
    // Handlers may block on slow upstreams; keep the runtime's async
    // workers out of it.
    let services = Arc::clone(&services);
    let batch_limit = body.batch_limit;
    let outcome =
        tokio::task::spawn_blocking(move || services.runner.process_due_jobs(batch_limit)).await;

    match outcome {
        Ok(Ok(processed_count)) => {
            Json(serde_json::json!({ "processed_count": processed_count })).into_response()
        }
        Ok(Err(e)) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            e.to_string(),
        ),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "runner_panic",
            e.to_string(),
        ),
    }
}
