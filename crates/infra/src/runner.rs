//! Job runner: claims due jobs and drives them to an outcome.

use std::collections::HashMap;
use std::thread;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use conductor_jobs::{Job, JobStatus, RetryPolicy};

use crate::job_store::{JobStore, JobStoreError};

/// Job handler function type.
///
/// Handlers are opaque and potentially slow or remote; the runner assumes
/// nothing about their latency. A handler error (or panic, or a missing
/// handler) is a recoverable `HandlerFailure` that drives the retry cycle —
/// it never propagates to whoever enqueued the job.
pub type JobHandler = Box<dyn Fn(&Job) -> Result<JsonValue, String> + Send + Sync>;

/// Batch runner for due background jobs.
///
/// Intended to be invoked on a fixed external schedule (a minutely cron
/// hitting the run endpoint); it is stateless between invocations and safe
/// to overlap with itself, because every job is claimed with a conditional
/// `Pending/Retrying → Running` write before execution.
pub struct JobRunner<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
    retry_policy: RetryPolicy,
}

impl<S: JobStore> JobRunner<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Register a handler for a job kind tag.
    pub fn register_handler<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    /// Claim and execute up to `batch_limit` due jobs, returning how many
    /// were driven to an outcome.
    ///
    /// Jobs in a batch run on their own scoped threads: one slow, failing,
    /// or panicking handler cannot block or abort the others.
    pub fn process_due_jobs(&self, batch_limit: usize) -> Result<usize, JobStoreError> {
        let now = Utc::now();
        let due = self.store.due(now, batch_limit)?;

        let mut claimed = Vec::with_capacity(due.len());
        for job in due {
            match self.store.try_start(job.id, now)? {
                Some(running) => claimed.push(running),
                None => debug!(job_id = %job.id, "job already claimed by another runner"),
            }
        }

        if claimed.is_empty() {
            return Ok(0);
        }

        let outcomes: Vec<Result<JsonValue, String>> = thread::scope(|scope| {
            let handles: Vec<_> = claimed
                .iter()
                .map(|job| scope.spawn(move || self.dispatch(job)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err("job handler panicked".to_string()))
                })
                .collect()
        });

        let mut processed = 0;
        for (mut job, outcome) in claimed.into_iter().zip(outcomes) {
            let finished_at = Utc::now();
            match outcome {
                Ok(result) => {
                    debug!(job_id = %job.id, kind = %job.kind, "job completed");
                    job.record_success(result, finished_at);
                }
                Err(failure) => {
                    warn!(
                        job_id = %job.id,
                        kind = %job.kind,
                        attempts = job.attempts + 1,
                        error = %failure,
                        "job handler failed"
                    );
                    job.record_failure(failure, &self.retry_policy, finished_at);
                    if job.status == JobStatus::Failed {
                        warn!(job_id = %job.id, kind = %job.kind, "job retries exhausted");
                    }
                }
            }

            // Persist per job so one bad row cannot discard the rest of the
            // batch's outcomes.
            match self.store.record_outcome(&job) {
                Ok(()) => processed += 1,
                Err(e) => error!(job_id = %job.id, error = %e, "failed to persist job outcome"),
            }
        }

        Ok(processed)
    }

    fn dispatch(&self, job: &Job) -> Result<JsonValue, String> {
        match self.handlers.get(job.kind.as_str()) {
            Some(handler) => handler(job),
            // Unknown kinds fail like any handler failure and burn an
            // attempt; a silent no-op would strand the job as due forever.
            None => Err(format!("no handler registered for job kind: {}", job.kind)),
        }
    }
}
