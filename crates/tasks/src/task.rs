//! Task model and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use conductor_core::{AgentId, CapabilitySet, EngineError, EngineResult, ProjectId, TaskId};

/// Task status lifecycle.
///
/// `Pending → Assigned → InProgress → {Completed, Failed}`, with
/// `Pending → Cancelled` as the only other exit. Terminal states are never
/// left again; a failed task is retried (if at all) as a new task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Statuses from which an owning agent may report a terminal outcome.
    pub fn accepts_disposition(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome reported by the owning agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    /// Work succeeded; the payload becomes `output_data`.
    Completed(JsonValue),
    /// Work failed; the message becomes `error_message`. Terminal — the task
    /// layer never retries.
    Failed(String),
}

impl TaskDisposition {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskDisposition::Completed(_) => TaskStatus::Completed,
            TaskDisposition::Failed(_) => TaskStatus::Failed,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            TaskDisposition::Completed(_) => "complete",
            TaskDisposition::Failed(_) => "fail",
        }
    }
}

/// Input for creating a task (everything the creator chooses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
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

/// A unit of work with capability/dependency prerequisites and an
/// owning-agent lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Higher priority is claimed first; `created_at` breaks ties (older first).
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// All listed tasks must be `Completed` before this task is assignable.
    pub dependencies: Vec<TaskId>,
    /// Empty means any agent qualifies.
    pub required_capabilities: CapabilitySet,
    /// Set exactly once at claim time, never cleared (assignment history).
    pub assigned_agent_id: Option<AgentId>,
    pub output_data: Option<JsonValue>,
    pub error_message: Option<String>,
}

impl Task {
    pub fn new(input: NewTask) -> EngineResult<Self> {
        if input.title.trim().is_empty() {
            return Err(EngineError::validation("task title must not be empty"));
        }
        Ok(Self {
            id: TaskId::new(),
            project_id: input.project_id,
            title: input.title,
            description: input.description,
            status: TaskStatus::Pending,
            priority: input.priority,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            dependencies: input.dependencies,
            required_capabilities: input.required_capabilities,
            assigned_agent_id: None,
            output_data: None,
            error_message: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check that `agent_id` may report a disposition, without mutating.
    ///
    /// Ownership is checked before lifecycle so a non-owner probing a
    /// terminal task still sees `NotAssigned`.
    pub fn check_disposition(&self, agent_id: AgentId, action: &str) -> EngineResult<()> {
        match self.assigned_agent_id {
            Some(owner) if owner == agent_id => {}
            _ => return Err(EngineError::NotAssigned),
        }
        if !self.status.accepts_disposition() {
            return Err(EngineError::invalid_state(self.status.as_str(), action));
        }
        Ok(())
    }

    /// Apply the claim transition (`Pending → Assigned`).
    ///
    /// Callers must make this conditional on the row still being `Pending`;
    /// the method itself is the in-memory half of that conditional write.
    pub fn apply_claim(&mut self, agent_id: AgentId, at: DateTime<Utc>) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        self.status = TaskStatus::Assigned;
        self.assigned_agent_id = Some(agent_id);
        self.started_at = Some(at);
    }

    /// Apply `Assigned → InProgress`.
    pub fn apply_start(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Assigned);
        self.status = TaskStatus::InProgress;
    }

    /// Apply a terminal disposition reported by the owning agent.
    pub fn apply_disposition(&mut self, disposition: TaskDisposition, at: DateTime<Utc>) {
        debug_assert!(self.status.accepts_disposition());
        self.status = disposition.status();
        self.completed_at = Some(at);
        match disposition {
            TaskDisposition::Completed(output) => self.output_data = Some(output),
            TaskDisposition::Failed(message) => self.error_message = Some(message),
        }
    }

    /// Apply `Pending → Cancelled`.
    pub fn apply_cancel(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Pending);
        self.status = TaskStatus::Cancelled;
    }
}
