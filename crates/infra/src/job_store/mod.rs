//! Background job storage abstraction.
//!
//! Same discipline as the task store: the contended transition (claiming a
//! due job into `Running`) is a conditional single-row write, so two runner
//! invocations overlapping on the same batch can never execute one job
//! twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use conductor_core::{JobId, ProjectId};
use conductor_jobs::{Job, JobKind};

mod in_memory;
mod postgres;

pub use in_memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {0} is not in the expected state for this write")]
    Conflict(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable FIFO-ish table of typed, payload-bearing jobs.
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Fetch a job by id.
    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Jobs eligible to run at `now`: status `Pending`/`Retrying`,
    /// `scheduled_at <= now`, and `next_retry_at` unset or passed. Ordered
    /// by `scheduled_at` asc, capped at `limit`.
    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Conditional claim: `Pending/Retrying → Running` iff the row is still
    /// claimable. `None` means another runner won the job (or the id is
    /// unknown).
    fn try_start(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError>;

    /// Persist the outcome of a job this runner holds in `Running`.
    /// Conditioned on the stored status still being `Running`.
    fn record_outcome(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Count a project's `Pending` jobs of the given kind (cascade
    /// thresholds).
    fn count_pending(&self, project_id: ProjectId, kind: &JobKind) -> Result<u64, JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id)
    }

    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).due(now, limit)
    }

    fn try_start(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        (**self).try_start(id, now)
    }

    fn record_outcome(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).record_outcome(job)
    }

    fn count_pending(&self, project_id: ProjectId, kind: &JobKind) -> Result<u64, JobStoreError> {
        (**self).count_pending(project_id, kind)
    }
}
