//! Task storage abstraction.
//!
//! ## Design
//!
//! Every contended lifecycle transition is a **conditional single-row
//! write**: the store applies the update only if the row is still in the
//! expected state and returns the updated row, or `None` when a concurrent
//! writer got there first. A plain read-then-write claim would double-assign
//! tasks under concurrent pollers; callers that see `None` re-read and move
//! on to the next candidate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use conductor_core::{AgentId, ProjectId, TaskId};
use conductor_tasks::{Task, TaskDisposition, TaskStatus};

mod in_memory;
mod postgres;

pub use in_memory::InMemoryTaskStore;
pub use postgres::PostgresTaskStore;

/// Task store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable table of task rows with conditional transitions.
pub trait TaskStore: Send + Sync {
    /// Insert a freshly created task.
    fn insert(&self, task: Task) -> Result<(), TaskStoreError>;

    /// Fetch a task by id.
    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError>;

    /// All `Pending` tasks ordered by `priority` desc, `created_at` asc —
    /// the scanning order of the assignment protocol.
    fn pending_ordered(&self) -> Result<Vec<Task>, TaskStoreError>;

    /// Current statuses of the given task ids. Unknown ids are absent from
    /// the result (and treated as incomplete by the eligibility check).
    fn dependency_statuses(
        &self,
        ids: &[TaskId],
    ) -> Result<HashMap<TaskId, TaskStatus>, TaskStoreError>;

    /// Conditional claim: `Pending → Assigned` with `assigned_agent_id` and
    /// `started_at` set, iff the row is still `Pending`. `None` means a
    /// concurrent poller won the row (or the id is unknown).
    fn try_claim(
        &self,
        id: TaskId,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError>;

    /// Conditional `Assigned → InProgress`, owner-conditioned.
    fn try_start(&self, id: TaskId, agent_id: AgentId) -> Result<Option<Task>, TaskStoreError>;

    /// Conditional terminal transition from `Assigned`/`InProgress`,
    /// owner-conditioned. Writes the disposition payload and `completed_at`.
    fn try_finish(
        &self,
        id: TaskId,
        agent_id: AgentId,
        disposition: TaskDisposition,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError>;

    /// Conditional `Pending → Cancelled`.
    fn try_cancel(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError>;

    /// Count a project's tasks in the given status (cascade thresholds).
    fn count_by_status(
        &self,
        project_id: ProjectId,
        status: TaskStatus,
    ) -> Result<u64, TaskStoreError>;
}

impl<S> TaskStore for Arc<S>
where
    S: TaskStore + ?Sized,
{
    fn insert(&self, task: Task) -> Result<(), TaskStoreError> {
        (**self).insert(task)
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        (**self).get(id)
    }

    fn pending_ordered(&self) -> Result<Vec<Task>, TaskStoreError> {
        (**self).pending_ordered()
    }

    fn dependency_statuses(
        &self,
        ids: &[TaskId],
    ) -> Result<HashMap<TaskId, TaskStatus>, TaskStoreError> {
        (**self).dependency_statuses(ids)
    }

    fn try_claim(
        &self,
        id: TaskId,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        (**self).try_claim(id, agent_id, at)
    }

    fn try_start(&self, id: TaskId, agent_id: AgentId) -> Result<Option<Task>, TaskStoreError> {
        (**self).try_start(id, agent_id)
    }

    fn try_finish(
        &self,
        id: TaskId,
        agent_id: AgentId,
        disposition: TaskDisposition,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        (**self).try_finish(id, agent_id, disposition, at)
    }

    fn try_cancel(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        (**self).try_cancel(id)
    }

    fn count_by_status(
        &self,
        project_id: ProjectId,
        status: TaskStatus,
    ) -> Result<u64, TaskStoreError> {
        (**self).count_by_status(project_id, status)
    }
}
