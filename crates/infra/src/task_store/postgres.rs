//! Postgres-backed task store implementation.
//!
//! Claims and terminal transitions are single conditional `UPDATE ... WHERE
//! status = ...` statements with `RETURNING`: the database's row-level
//! atomicity is the only lock. Zero rows back means a concurrent writer won
//! the row, which the caller treats as a lost race, never an error.
//!
//! Expected schema (migrations are managed outside this crate):
//!
//! ```sql
//! CREATE TABLE tasks (
//!     id                    UUID PRIMARY KEY,
//!     project_id            UUID NOT NULL,
//!     title                 TEXT NOT NULL,
//!     description           TEXT,
//!     status                TEXT NOT NULL,
//!     priority              INT  NOT NULL,
//!     created_at            TIMESTAMPTZ NOT NULL,
//!     started_at            TIMESTAMPTZ,
//!     completed_at          TIMESTAMPTZ,
//!     dependencies          JSONB NOT NULL DEFAULT '[]',
//!     required_capabilities JSONB NOT NULL DEFAULT '[]',
//!     assigned_agent_id     UUID,
//!     output_data           JSONB,
//!     error_message         TEXT
//! );
//! CREATE INDEX tasks_pending_scan
//!     ON tasks (priority DESC, created_at ASC) WHERE status = 'pending';
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use conductor_core::{AgentId, ProjectId, TaskId};
use conductor_tasks::{Task, TaskDisposition, TaskStatus};

use super::{TaskStore, TaskStoreError};

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, created_at, \
     started_at, completed_at, dependencies, required_capabilities, assigned_agent_id, \
     output_data, error_message";

/// Postgres-backed task store.
///
/// The trait is sync; operations run on the ambient Tokio runtime via
/// `Handle::block_on`, the same bridging the rest of the storage layer uses.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: Arc<PgPool>,
}

impl PostgresTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn block_on<T>(
        &self,
        fut: impl Future<Output = Result<T, TaskStoreError>>,
    ) -> Result<T, TaskStoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            TaskStoreError::Storage("no tokio runtime available for postgres task store".to_string())
        })?;
        handle.block_on(fut)
    }

    pub async fn insert_task(&self, task: &Task) -> Result<(), TaskStoreError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, project_id, title, description, status, priority, created_at,
                               started_at, completed_at, dependencies, required_capabilities,
                               assigned_agent_id, output_data, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.project_id.as_uuid())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(serde_json::to_value(&task.dependencies).unwrap_or_default())
        .bind(serde_json::to_value(&task.required_capabilities).unwrap_or_default())
        .bind(task.assigned_agent_id.map(|a| *a.as_uuid()))
        .bind(&task.output_data)
        .bind(&task.error_message)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_insert_error(e, task.id))?;

        Ok(())
    }

    pub async fn fetch_task(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn fetch_pending_ordered(&self) -> Result<Vec<Task>, TaskStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'pending' \
             ORDER BY priority DESC, created_at ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(row_to_task).collect()
    }

    pub async fn fetch_dependency_statuses(
        &self,
        ids: &[TaskId],
    ) -> Result<HashMap<TaskId, TaskStatus>, TaskStoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query("SELECT id, status FROM tasks WHERE id = ANY($1)")
            .bind(&uuids)
            .fetch_all(&*self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").map_err(storage_error)?;
                let status: String = row.try_get("status").map_err(storage_error)?;
                Ok((TaskId::from_uuid(id), parse_status(&status)?))
            })
            .collect()
    }

    pub async fn claim_task(
        &self,
        id: TaskId,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'assigned', assigned_agent_id = $2, started_at = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(agent_id.as_uuid())
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn start_task(
        &self,
        id: TaskId,
        agent_id: AgentId,
    ) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'in_progress'
            WHERE id = $1 AND assigned_agent_id = $2 AND status = 'assigned'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(agent_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn finish_task(
        &self,
        id: TaskId,
        agent_id: AgentId,
        disposition: TaskDisposition,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let (status, output_data, error_message) = match disposition {
            TaskDisposition::Completed(output) => (TaskStatus::Completed, Some(output), None),
            TaskDisposition::Failed(message) => (TaskStatus::Failed, None, Some(message)),
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = $3, output_data = $4, error_message = $5, completed_at = $6
            WHERE id = $1 AND assigned_agent_id = $2
              AND status IN ('assigned', 'in_progress')
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(agent_id.as_uuid())
        .bind(status.as_str())
        .bind(output_data)
        .bind(error_message)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn cancel_task(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'cancelled'
            WHERE id = $1 AND status = 'pending'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| row_to_task(&r)).transpose()
    }

    pub async fn count_tasks(
        &self,
        project_id: ProjectId,
        status: TaskStatus,
    ) -> Result<u64, TaskStoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE project_id = $1 AND status = $2")
                .bind(project_id.as_uuid())
                .bind(status.as_str())
                .fetch_one(&*self.pool)
                .await
                .map_err(storage_error)?;

        Ok(count.max(0) as u64)
    }
}

impl TaskStore for PostgresTaskStore {
    fn insert(&self, task: Task) -> Result<(), TaskStoreError> {
        self.block_on(self.insert_task(&task))
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        self.block_on(self.fetch_task(id))
    }

    fn pending_ordered(&self) -> Result<Vec<Task>, TaskStoreError> {
        self.block_on(self.fetch_pending_ordered())
    }

    fn dependency_statuses(
        &self,
        ids: &[TaskId],
    ) -> Result<HashMap<TaskId, TaskStatus>, TaskStoreError> {
        self.block_on(self.fetch_dependency_statuses(ids))
    }

    fn try_claim(
        &self,
        id: TaskId,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        self.block_on(self.claim_task(id, agent_id, at))
    }

    fn try_start(&self, id: TaskId, agent_id: AgentId) -> Result<Option<Task>, TaskStoreError> {
        self.block_on(self.start_task(id, agent_id))
    }

    fn try_finish(
        &self,
        id: TaskId,
        agent_id: AgentId,
        disposition: TaskDisposition,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>, TaskStoreError> {
        self.block_on(self.finish_task(id, agent_id, disposition, at))
    }

    fn try_cancel(&self, id: TaskId) -> Result<Option<Task>, TaskStoreError> {
        self.block_on(self.cancel_task(id))
    }

    fn count_by_status(
        &self,
        project_id: ProjectId,
        status: TaskStatus,
    ) -> Result<u64, TaskStoreError> {
        self.block_on(self.count_tasks(project_id, status))
    }
}

fn storage_error(e: impl core::fmt::Display) -> TaskStoreError {
    TaskStoreError::Storage(e.to_string())
}

fn map_insert_error(e: sqlx::Error, id: TaskId) -> TaskStoreError {
    if let sqlx::Error::Database(db) = &e {
        // 23505 = unique_violation (duplicate primary key).
        if db.code().as_deref() == Some("23505") {
            return TaskStoreError::AlreadyExists(id);
        }
    }
    storage_error(e)
}

fn parse_status(s: &str) -> Result<TaskStatus, TaskStoreError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "assigned" => Ok(TaskStatus::Assigned),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(TaskStoreError::Storage(format!(
            "unknown task status in storage: {other}"
        ))),
    }
}

fn row_to_task(row: &PgRow) -> Result<Task, TaskStoreError> {
    let status: String = row.try_get("status").map_err(storage_error)?;
    let dependencies: serde_json::Value = row.try_get("dependencies").map_err(storage_error)?;
    let required_capabilities: serde_json::Value =
        row.try_get("required_capabilities").map_err(storage_error)?;

    Ok(Task {
        id: TaskId::from_uuid(row.try_get("id").map_err(storage_error)?),
        project_id: ProjectId::from_uuid(row.try_get("project_id").map_err(storage_error)?),
        title: row.try_get("title").map_err(storage_error)?,
        description: row.try_get("description").map_err(storage_error)?,
        status: parse_status(&status)?,
        priority: row.try_get("priority").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        started_at: row.try_get("started_at").map_err(storage_error)?,
        completed_at: row.try_get("completed_at").map_err(storage_error)?,
        dependencies: serde_json::from_value(dependencies).map_err(storage_error)?,
        required_capabilities: serde_json::from_value(required_capabilities)
            .map_err(storage_error)?,
        assigned_agent_id: row
            .try_get::<Option<Uuid>, _>("assigned_agent_id")
            .map_err(storage_error)?
            .map(AgentId::from_uuid),
        output_data: row.try_get("output_data").map_err(storage_error)?,
        error_message: row.try_get("error_message").map_err(storage_error)?,
    })
}
