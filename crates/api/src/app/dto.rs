//! Request DTOs and JSON mapping helpers.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use conductor_core::{AgentId, CapabilitySet, ProjectId, TaskId};

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    #[serde(default)]
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: ProjectId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub required_capabilities: CapabilitySet,
}

#[derive(Debug, Deserialize)]
pub struct PollRequest {
    pub agent_id: AgentId,
    /// When omitted, the agent's registered capabilities are used.
    #[serde(default)]
    pub capabilities: Option<CapabilitySet>,
}

#[derive(Debug, Deserialize)]
pub struct StartTaskRequest {
    pub agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    pub agent_id: AgentId,
    #[serde(default)]
    pub output_data: JsonValue,
}

#[derive(Debug, Deserialize)]
pub struct FailTaskRequest {
    pub agent_id: AgentId,
    pub error_message: String,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: JsonValue,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RunJobsRequest {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

fn default_batch_limit() -> usize {
    10
}
