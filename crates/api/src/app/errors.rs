//! Consistent JSON error responses.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use conductor_core::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        EngineError::NotAssigned => json_error(
            StatusCode::FORBIDDEN,
            "not_assigned",
            "task is not assigned to this agent",
        ),
        EngineError::InvalidState { from, action } => json_error(
            StatusCode::CONFLICT,
            "invalid_state",
            format!("cannot {action} a task in status {from}"),
        ),
        EngineError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        EngineError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
