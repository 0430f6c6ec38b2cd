//! Cascade trigger: follow-up jobs enqueued on task completion.

use serde_json::json;
use tracing::{debug, warn};

use conductor_jobs::{Job, JobKind};
use conductor_tasks::{Task, TaskStatus};

use crate::assignment::CompletionObserver;
use crate::job_store::JobStore;
use crate::task_store::TaskStore;

/// Every Nth completed task in a project triggers pattern detection.
pub const PATTERN_DETECTION_INTERVAL: u64 = 5;

/// Pending analysis backlog size that triggers a suggestion review.
pub const REVIEW_BACKLOG_THRESHOLD: u64 = 10;

/// Enqueues analysis jobs when completion counters cross fixed thresholds.
///
/// Thresholds are recomputed by counting rows at trigger time rather than
/// kept as in-memory counters, which survives restarts and multiple
/// instances but is only best-effort under racing completions: a threshold
/// can double-fire or skip. The downstream analyses tolerate both.
///
/// Everything here is fire-and-forget: an enqueue or count failure is
/// logged and swallowed, because task completion must never fail on account
/// of analysis scheduling.
pub struct CascadeTrigger<T: TaskStore, J: JobStore> {
    tasks: T,
    jobs: J,
}

impl<T: TaskStore, J: JobStore> CascadeTrigger<T, J> {
    pub fn new(tasks: T, jobs: J) -> Self {
        Self { tasks, jobs }
    }

    fn enqueue(&self, job: Job) {
        let kind = job.kind.clone();
        match self.jobs.enqueue(job) {
            Ok(job_id) => debug!(%job_id, %kind, "cascade job enqueued"),
            Err(e) => warn!(%kind, error = %e, "cascade enqueue failed, dropping"),
        }
    }
}

impl<T: TaskStore, J: JobStore> CompletionObserver for CascadeTrigger<T, J> {
    fn on_task_completed(&self, task: &Task) {
        // Every completion gets an analysis pass.
        self.enqueue(
            Job::new(JobKind::AnalyzeCompletedTask, json!({"task_id": task.id}))
                .for_project(task.project_id),
        );

        match self
            .tasks
            .count_by_status(task.project_id, TaskStatus::Completed)
        {
            Ok(completed) => {
                if completed > 0 && completed % PATTERN_DETECTION_INTERVAL == 0 {
                    self.enqueue(
                        Job::new(JobKind::DetectPatterns, json!({"project_id": task.project_id}))
                            .for_project(task.project_id),
                    );
                }
            }
            Err(e) => warn!(error = %e, "completed-task count failed, skipping pattern check"),
        }

        match self
            .jobs
            .count_pending(task.project_id, &JobKind::AnalyzeCompletedTask)
        {
            Ok(backlog) => {
                if backlog >= REVIEW_BACKLOG_THRESHOLD {
                    self.enqueue(
                        Job::new(
                            JobKind::ReviewSuggestions,
                            json!({"project_id": task.project_id}),
                        )
                        .for_project(task.project_id),
                    );
                }
            }
            Err(e) => warn!(error = %e, "analysis backlog count failed, skipping review check"),
        }
    }
}
