//! In-memory task store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use conductor_core::{AgentId, ProjectId, TaskId};
use conductor_tasks::{Task, TaskDisposition, TaskStatus};

use super::{TaskStore, TaskStoreError};

/// In-memory task store.
///
/// The whole-map `RwLock` stands in for the database's row-level atomicity:
/// each `try_*` method takes the write lock for the read-check-write of a
/// single row, which gives the same conditional-update semantics.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, task: Task) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(TaskStoreError::AlreadyExists(task.id));
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        Ok(self.tasks.read().unwrap().get(&id).cloned())
    }

    fn pending_ordered(&self) -> Result<Vec<Task>, TaskStoreError> {
        let tasks = self.tasks.read().unwrap();
        let mut pending: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(pending)
    }

    fn dependency_statuses(
        &self,
        ids: &[TaskId],
    ) -> Result<HashMap<TaskId, TaskStatus>, TaskStoreError> {
        let tasks = self.tasks.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| tasks.get(id).map(|t| (*id, t.status)))
            .collect())
    }

    fn try_claim(
        &self,
        id: TaskId,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.apply_claim(agent_id, at);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn try_start(&self, id: TaskId, agent_id: AgentId) -> Result<Option<Task>, TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.get_mut(&id) {
            Some(task)
                if task.status == TaskStatus::Assigned
                    && task.assigned_agent_id == Some(agent_id) =>
            {
                task.apply_start();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn try_finish(
        &self,
        id: TaskId,
        agent_id: AgentId,
        disposition: TaskDisposition,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.get_mut(&id) {
            Some(task)
                if task.status.accepts_disposition()
                    && task.assigned_agent_id == Some(agent_id) =>
            {
                task.apply_disposition(disposition, at);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn try_cancel(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        let mut tasks = self.tasks.write().unwrap();
        match tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.apply_cancel();
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    fn count_by_status(
        &self,
        project_id: ProjectId,
        status: TaskStatus,
    ) -> Result<u64, TaskStoreError> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks
            .values()
            .filter(|t| t.project_id == project_id && t.status == status)
            .count() as u64)
    }
}
