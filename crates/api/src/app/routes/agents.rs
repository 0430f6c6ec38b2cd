use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use conductor_core::AgentId;

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_agent).get(list_agents))
        .route("/:id", get(get_agent))
}

pub async fn register_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterAgentRequest>,
) -> axum::response::Response {
    match services.agents.register(body.name, body.capabilities) {
        Ok(agent) => (StatusCode::CREATED, Json(agent)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agent_id: AgentId = match id.parse() {
        Ok(id) => id,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "malformed agent id")
        }
    };

    match services.agents.get(agent_id) {
        Ok(agent) => Json(agent).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_agents(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    Json(services.agents.list()).into_response()
}
