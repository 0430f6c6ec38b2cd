use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use conductor_core::TaskId;
use conductor_tasks::NewTask;

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_task))
        .route("/poll", post(poll_next))
        .route("/:id", get(get_task))
        .route("/:id/start", post(start_task))
        .route("/:id/complete", post(complete_task))
        .route("/:id/fail", post(fail_task))
        .route("/:id/cancel", post(cancel_task))
}

fn parse_task_id(id: &str) -> Result<TaskId, axum::response::Response> {
    id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "malformed task id")
    })
}

pub async fn create_task(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateTaskRequest>,
) -> axum::response::Response {
    let input = NewTask {
        project_id: body.project_id,
        title: body.title,
        description: body.description,
        priority: body.priority,
        dependencies: body.dependencies,
        required_capabilities: body.required_capabilities,
    };

    match services.assignment.create(input) {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.assignment.get(task_id) {
        Ok(task) => Json(task).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Claim the next eligible task for the calling agent.
///
/// An empty backlog is a successful `{"task": null}` response, never an
/// error; callers poll again later on their own schedule.
pub async fn poll_next(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::PollRequest>,
) -> axum::response::Response {
    let capabilities = match body.capabilities {
        Some(capabilities) => capabilities,
        None => match services.agents.get(body.agent_id) {
            Ok(agent) => agent.capabilities,
            Err(e) => return errors::engine_error_to_response(e),
        },
    };

    match services.assignment.poll_next(body.agent_id, &capabilities) {
        Ok(task) => Json(serde_json::json!({ "task": task })).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn start_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::StartTaskRequest>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.assignment.start(task_id, body.agent_id) {
        Ok(task) => Json(task).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn complete_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CompleteTaskRequest>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .assignment
        .complete(task_id, body.agent_id, body.output_data)
    {
        Ok(task) => Json(task).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn fail_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::FailTaskRequest>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .assignment
        .fail(task_id, body.agent_id, body.error_message)
    {
        Ok(task) => Json(task).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.assignment.cancel(task_id) {
        Ok(task) => Json(task).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
