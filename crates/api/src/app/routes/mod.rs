use axum::Router;

pub mod agents;
pub mod jobs;
pub mod system;
pub mod tasks;

/// Router for all engine endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/agents", agents::router())
        .nest("/tasks", tasks::router())
        .nest("/jobs", jobs::router())
}
