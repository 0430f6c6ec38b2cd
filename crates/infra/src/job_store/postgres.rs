//! Postgres-backed job store implementation.
//!
//! Expected schema (migrations are managed outside this crate):
//!
//! ```sql
//! CREATE TABLE background_jobs (
//!     id            UUID PRIMARY KEY,
//!     project_id    UUID,
//!     kind          TEXT NOT NULL,
//!     payload       JSONB NOT NULL DEFAULT '{}',
//!     status        TEXT NOT NULL,
//!     attempts      INT  NOT NULL DEFAULT 0,
//!     max_attempts  INT  NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL,
//!     updated_at    TIMESTAMPTZ NOT NULL,
//!     scheduled_at  TIMESTAMPTZ NOT NULL,
//!     next_retry_at TIMESTAMPTZ,
//!     completed_at  TIMESTAMPTZ,
//!     result        JSONB,
//!     error_message TEXT
//! );
//! CREATE INDEX background_jobs_due_scan
//!     ON background_jobs (scheduled_at ASC) WHERE status IN ('pending', 'retrying');
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use conductor_core::{JobId, ProjectId};
use conductor_jobs::{Job, JobKind, JobStatus};

use super::{JobStore, JobStoreError};

const JOB_COLUMNS: &str = "id, project_id, kind, payload, status, attempts, max_attempts, \
     created_at, updated_at, scheduled_at, next_retry_at, completed_at, result, error_message";

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn block_on<T>(
        &self,
        fut: impl Future<Output = Result<T, JobStoreError>>,
    ) -> Result<T, JobStoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            JobStoreError::Storage("no tokio runtime available for postgres job store".to_string())
        })?;
        handle.block_on(fut)
    }

    pub async fn insert_job(&self, job: &Job) -> Result<JobId, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO background_jobs (id, project_id, kind, payload, status, attempts,
                                         max_attempts, created_at, updated_at, scheduled_at,
                                         next_retry_at, completed_at, result, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.project_id.map(|p| *p.as_uuid()))
        .bind(job.kind.as_str())
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.scheduled_at)
        .bind(job.next_retry_at)
        .bind(job.completed_at)
        .bind(&job.result)
        .bind(&job.error_message)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_insert_error(e, job.id))?;

        Ok(job.id)
    }

    pub async fn fetch_job(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM background_jobs WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn fetch_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM background_jobs
            WHERE status IN ('pending', 'retrying')
              AND scheduled_at <= $1
              AND (next_retry_at IS NULL OR next_retry_at <= $1)
            ORDER BY scheduled_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(row_to_job).collect()
    }

    pub async fn start_job(
        &self,
        id: JobId,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE background_jobs
            SET status = 'running', updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'retrying')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn write_outcome(&self, job: &Job) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE background_jobs
            SET status = $2, attempts = $3, updated_at = $4, next_retry_at = $5,
                completed_at = $6, result = $7, error_message = $8
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.attempts as i32)
        .bind(job.updated_at)
        .bind(job.next_retry_at)
        .bind(job.completed_at)
        .bind(&job.result)
        .bind(&job.error_message)
        .execute(&*self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::Conflict(job.id));
        }
        Ok(())
    }

    pub async fn count_pending_jobs(
        &self,
        project_id: ProjectId,
        kind: &JobKind,
    ) -> Result<u64, JobStoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM background_jobs \
             WHERE project_id = $1 AND kind = $2 AND status = 'pending'",
        )
        .bind(project_id.as_uuid())
        .bind(kind.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(storage_error)?;

        Ok(count.max(0) as u64)
    }
}

impl JobStore for PostgresJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        self.block_on(self.insert_job(&job))
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.block_on(self.fetch_job(id))
    }

    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        self.block_on(self.fetch_due(now, limit))
    }

    fn try_start(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        self.block_on(self.start_job(id, now))
    }

    fn record_outcome(&self, job: &Job) -> Result<(), JobStoreError> {
        self.block_on(self.write_outcome(job))
    }

    fn count_pending(&self, project_id: ProjectId, kind: &JobKind) -> Result<u64, JobStoreError> {
        self.block_on(self.count_pending_jobs(project_id, kind))
    }
}

fn storage_error(e: impl core::fmt::Display) -> JobStoreError {
    JobStoreError::Storage(e.to_string())
}

fn map_insert_error(e: sqlx::Error, id: JobId) -> JobStoreError {
    if let sqlx::Error::Database(db) = &e {
        // 23505 = unique_violation (duplicate primary key).
        if db.code().as_deref() == Some("23505") {
            return JobStoreError::AlreadyExists(id);
        }
    }
    storage_error(e)
}

fn parse_status(s: &str) -> Result<JobStatus, JobStoreError> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "retrying" => Ok(JobStatus::Retrying),
        other => Err(JobStoreError::Storage(format!(
            "unknown job status in storage: {other}"
        ))),
    }
}

fn row_to_job(row: &PgRow) -> Result<Job, JobStoreError> {
    let kind: String = row.try_get("kind").map_err(storage_error)?;
    let status: String = row.try_get("status").map_err(storage_error)?;
    let attempts: i32 = row.try_get("attempts").map_err(storage_error)?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(storage_error)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(storage_error)?),
        project_id: row
            .try_get::<Option<Uuid>, _>("project_id")
            .map_err(storage_error)?
            .map(ProjectId::from_uuid),
        kind: JobKind::from(kind),
        payload: row.try_get("payload").map_err(storage_error)?,
        status: parse_status(&status)?,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(1) as u32,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
        scheduled_at: row.try_get("scheduled_at").map_err(storage_error)?,
        next_retry_at: row.try_get("next_retry_at").map_err(storage_error)?,
        completed_at: row.try_get("completed_at").map_err(storage_error)?,
        result: row.try_get("result").map_err(storage_error)?,
        error_message: row.try_get("error_message").map_err(storage_error)?,
    })
}
