//! In-memory job store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use conductor_core::{JobId, ProjectId};
use conductor_jobs::{Job, JobKind, JobStatus};

use super::{JobStore, JobStoreError};

/// In-memory job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs.read().unwrap().get(&id).cloned())
    }

    fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut due: Vec<Job> = jobs.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        due.truncate(limit);
        Ok(due)
    }

    fn try_start(&self, id: JobId, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status.is_claimable() => {
                job.mark_running(now);
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    fn record_outcome(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&job.id) {
            Some(stored) if stored.status == JobStatus::Running => {
                *stored = job.clone();
                Ok(())
            }
            Some(stored) => Err(JobStoreError::Conflict(stored.id)),
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    fn count_pending(&self, project_id: ProjectId, kind: &JobKind) -> Result<u64, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs
            .values()
            .filter(|j| {
                j.project_id == Some(project_id)
                    && &j.kind == kind
                    && j.status == JobStatus::Pending
            })
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    #[test]
    fn due_respects_schedule_order_and_limit() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let late = Job::new(JobKind::DetectPatterns, json!({}))
            .scheduled_at(now - ChronoDuration::minutes(1));
        let early = Job::new(JobKind::DetectPatterns, json!({}))
            .scheduled_at(now - ChronoDuration::minutes(10));
        let future = Job::new(JobKind::DetectPatterns, json!({}))
            .scheduled_at(now + ChronoDuration::minutes(10));
        let (late_id, early_id) = (late.id, early.id);

        store.enqueue(late).unwrap();
        store.enqueue(early).unwrap();
        store.enqueue(future).unwrap();

        let due: Vec<JobId> = store.due(now, 10).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(due, vec![early_id, late_id]);

        assert_eq!(store.due(now, 1).unwrap().len(), 1);
    }

    #[test]
    fn retrying_job_waits_for_next_retry_at() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut job = Job::new(JobKind::AnalyzeCompletedTask, json!({}));
        job.mark_running(now);
        job.record_failure("x".to_string(), &Default::default(), now);
        assert_eq!(job.status, JobStatus::Retrying);
        store.enqueue(job.clone()).unwrap();

        assert!(store.due(now, 10).unwrap().is_empty());
        let after_backoff = now + ChronoDuration::minutes(3);
        assert_eq!(store.due(after_backoff, 10).unwrap().len(), 1);
    }

    #[test]
    fn start_is_conditional_on_claimable_status() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let job = Job::new(JobKind::DetectPatterns, json!({}));
        let id = store.enqueue(job).unwrap();

        let first = store.try_start(id, now).unwrap();
        assert_eq!(first.unwrap().status, JobStatus::Running);

        // A second overlapping runner loses the claim.
        assert!(store.try_start(id, now).unwrap().is_none());
    }

    #[test]
    fn outcome_write_requires_running_row() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let job = Job::new(JobKind::DetectPatterns, json!({}));
        let id = store.enqueue(job).unwrap();

        let mut running = store.try_start(id, now).unwrap().unwrap();
        running.record_success(json!({"ok": true}), now);
        store.record_outcome(&running).unwrap();

        // The row is Completed now; a stale second write is rejected.
        assert!(matches!(
            store.record_outcome(&running),
            Err(JobStoreError::Conflict(_))
        ));
    }

    #[test]
    fn pending_counts_are_scoped() {
        let store = InMemoryJobStore::new();
        let project = ProjectId::new();

        for _ in 0..3 {
            store
                .enqueue(
                    Job::new(JobKind::AnalyzeCompletedTask, json!({})).for_project(project),
                )
                .unwrap();
        }
        // Different kind, different project, unscoped: all excluded.
        store
            .enqueue(Job::new(JobKind::DetectPatterns, json!({})).for_project(project))
            .unwrap();
        store
            .enqueue(
                Job::new(JobKind::AnalyzeCompletedTask, json!({})).for_project(ProjectId::new()),
            )
            .unwrap();
        store
            .enqueue(Job::new(JobKind::AnalyzeCompletedTask, json!({})))
            .unwrap();

        assert_eq!(
            store
                .count_pending(project, &JobKind::AnalyzeCompletedTask)
                .unwrap(),
            3
        );
    }
}
