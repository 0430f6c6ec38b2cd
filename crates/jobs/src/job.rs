//! Background job record and status lifecycle.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use conductor_core::{JobId, ProjectId};

use crate::kind::JobKind;
use crate::retry::RetryPolicy;

/// Default retry budget for newly enqueued jobs.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Job execution status.
///
/// `Pending/Retrying → Running → {Completed, Failed, Retrying}`. `Retrying`
/// jobs re-enter `Running` once `next_retry_at` passes; `Failed` means the
/// retry budget is exhausted and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses a runner may claim from.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Retrying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retryable, typed, asynchronous unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Scopes cascade count queries; jobs enqueued directly may have none.
    pub project_id: Option<ProjectId>,
    pub kind: JobKind,
    /// Passed verbatim to the handler.
    pub payload: JsonValue,
    pub status: JobStatus,
    /// Finished execution attempts so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest eligible execution time.
    pub scheduled_at: DateTime<Utc>,
    /// When set, the job is not due before this instant even while `Retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(kind: JobKind, payload: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            project_id: None,
            kind,
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: now,
            updated_at: now,
            scheduled_at: now,
            next_retry_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    /// Scope the job to a project (enables threshold count queries).
    pub fn for_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Delay the first execution until `at`.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = at;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Check whether the job may be claimed for execution at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable()
            && self.scheduled_at <= now
            && self.next_retry_at.is_none_or(|at| at <= now)
    }

    /// Claim transition: `Pending/Retrying → Running`.
    ///
    /// Callers must make this conditional on the stored status still being
    /// claimable; this method is the in-memory half of that conditional write.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        debug_assert!(self.status.is_claimable());
        self.status = JobStatus::Running;
        self.updated_at = now;
    }

    /// Record a successful handler outcome.
    pub fn record_success(&mut self, result: JsonValue, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error_message = None;
        self.next_retry_at = None;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Record a failed handler outcome, scheduling a retry while the budget
    /// lasts and failing terminally once it is exhausted.
    pub fn record_failure(&mut self, error: String, policy: &RetryPolicy, now: DateTime<Utc>) {
        self.attempts += 1;
        self.error_message = Some(error);
        self.updated_at = now;

        if self.attempts < self.max_attempts {
            let delay = policy.delay_after(self.attempts);
            self.status = JobStatus::Retrying;
            self.next_retry_at =
                Some(now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero()));
        } else {
            self.status = JobStatus::Failed;
            self.next_retry_at = None;
            self.completed_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_job_is_due_immediately() {
        let job = Job::new(JobKind::DetectPatterns, json!({}));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.is_due(Utc::now()));
    }

    #[test]
    fn scheduled_job_is_not_due_early() {
        let now = Utc::now();
        let job = Job::new(JobKind::DetectPatterns, json!({}))
            .scheduled_at(now + ChronoDuration::minutes(5));
        assert!(!job.is_due(now));
        assert!(job.is_due(now + ChronoDuration::minutes(5)));
    }

    #[test]
    fn success_clears_error_state() {
        let now = Utc::now();
        let mut job = Job::new(JobKind::AnalyzeCompletedTask, json!({"task_id": "t1"}));
        job.mark_running(now);
        job.record_success(json!({"task_id": "t1"}), now);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"task_id": "t1"})));
        assert!(job.error_message.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn failures_back_off_then_exhaust() {
        let policy = RetryPolicy::default();
        let now = Utc::now();
        let mut job = Job::new(JobKind::AnalyzeCompletedTask, json!({})).with_max_attempts(3);

        job.mark_running(now);
        job.record_failure("boom".to_string(), &policy, now);
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.next_retry_at, Some(now + ChronoDuration::minutes(2)));
        assert!(!job.is_due(now));
        assert!(job.is_due(now + ChronoDuration::minutes(2)));

        job.mark_running(now);
        job.record_failure("boom again".to_string(), &policy, now);
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.next_retry_at, Some(now + ChronoDuration::minutes(4)));

        job.mark_running(now);
        job.record_failure("boom final".to_string(), &policy, now);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert!(job.next_retry_at.is_none());
        assert!(job.completed_at.is_some());
        // Terminal: no longer claimable at any time.
        assert!(!job.is_due(now + ChronoDuration::days(1)));
    }

    #[test]
    fn max_attempts_floor_is_one() {
        let job = Job::new(JobKind::DetectPatterns, json!({})).with_max_attempts(0);
        assert_eq!(job.max_attempts, 1);
    }
}
