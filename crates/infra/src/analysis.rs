//! Analysis backend seam.
//!
//! The content of analysis work (an LLM call in production) is outside this
//! engine; only its contract lives here. A backend receives the id the job
//! payload names and returns an opaque result document or a failure string,
//! which the runner turns into the usual retry cycle.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing::info;

use conductor_core::{ProjectId, TaskId};
use conductor_jobs::{Job, JobKind};

use crate::job_store::JobStore;
use crate::runner::JobRunner;

/// External analysis provider, one method per built-in job kind.
pub trait AnalysisBackend: Send + Sync + 'static {
    fn analyze_task(&self, task_id: TaskId) -> Result<JsonValue, String>;
    fn detect_patterns(&self, project_id: ProjectId) -> Result<JsonValue, String>;
    fn review_suggestions(&self, project_id: ProjectId) -> Result<JsonValue, String>;
}

/// Dev/test backend: logs the request and echoes a minimal result document.
#[derive(Debug, Default)]
pub struct EchoAnalysisBackend;

impl AnalysisBackend for EchoAnalysisBackend {
    fn analyze_task(&self, task_id: TaskId) -> Result<JsonValue, String> {
        info!(%task_id, "echo analysis backend: analyze task");
        Ok(json!({"task_id": task_id, "insights": []}))
    }

    fn detect_patterns(&self, project_id: ProjectId) -> Result<JsonValue, String> {
        info!(%project_id, "echo analysis backend: detect patterns");
        Ok(json!({"project_id": project_id, "patterns": []}))
    }

    fn review_suggestions(&self, project_id: ProjectId) -> Result<JsonValue, String> {
        info!(%project_id, "echo analysis backend: review suggestions");
        Ok(json!({"project_id": project_id, "reviewed": 0}))
    }
}

/// Wire a backend into the runner's handler table for the built-in kinds.
pub fn register_analysis_handlers<S: JobStore>(
    runner: &mut JobRunner<S>,
    backend: Arc<dyn AnalysisBackend>,
) {
    let analyze = Arc::clone(&backend);
    runner.register_handler(JobKind::ANALYZE_COMPLETED_TASK, move |job: &Job| {
        analyze.analyze_task(payload_id(job, "task_id")?.into())
    });

    let patterns = Arc::clone(&backend);
    runner.register_handler(JobKind::DETECT_PATTERNS, move |job: &Job| {
        patterns.detect_patterns(payload_id(job, "project_id")?.into())
    });

    runner.register_handler(JobKind::REVIEW_SUGGESTIONS, move |job: &Job| {
        backend.review_suggestions(payload_id(job, "project_id")?.into())
    });
}

/// Pull a uuid field out of a job payload; a malformed payload is a handler
/// failure like any other and burns an attempt.
fn payload_id(job: &Job, field: &str) -> Result<uuid::Uuid, String> {
    job.payload
        .get(field)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| format!("job payload missing {field}"))?
        .parse::<uuid::Uuid>()
        .map_err(|e| format!("job payload has malformed {field}: {e}"))
}
