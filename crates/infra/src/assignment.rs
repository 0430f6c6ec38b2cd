//! Assignment protocol: claim, progress, and terminal reporting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use conductor_core::{AgentId, CapabilitySet, EngineError, EngineResult, TaskId};
use conductor_tasks::{is_eligible, NewTask, Task, TaskDisposition};

use crate::task_store::{TaskStore, TaskStoreError};

/// Observer notified synchronously after a task reaches `Completed`.
///
/// Implementations are fire-and-forget: they must swallow their own
/// failures, because completing a task may never fail on account of a
/// downstream side effect.
pub trait CompletionObserver: Send + Sync {
    fn on_task_completed(&self, task: &Task);
}

/// Stateless task-assignment service over a shared store.
///
/// All coordination happens through the store's conditional writes; any
/// number of service instances (or callers of one instance) may race freely.
pub struct AssignmentService<S: TaskStore> {
    store: S,
    observer: Option<Arc<dyn CompletionObserver>>,
}

impl<S: TaskStore> AssignmentService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            observer: None,
        }
    }

    /// Attach the completion observer (the cascade trigger in production).
    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Create a new pending task.
    pub fn create(&self, input: NewTask) -> EngineResult<Task> {
        let task = Task::new(input)?;
        self.store.insert(task.clone()).map_err(store_error)?;
        info!(task_id = %task.id, project_id = %task.project_id, "task created");
        Ok(task)
    }

    pub fn get(&self, task_id: TaskId) -> EngineResult<Task> {
        self.store
            .get(task_id)
            .map_err(store_error)?
            .ok_or(EngineError::NotFound)
    }

    /// Claim the next eligible task for `agent_id`, or `None` when nothing
    /// is assignable right now (an empty result, not an error).
    ///
    /// Candidates are scanned in priority-desc / created-at-asc order; each
    /// candidate is filtered against the capability and dependency gates on
    /// a snapshot, then claimed with a conditional `Pending → Assigned`
    /// write. Losing that write to a concurrent poller just moves the scan
    /// to the next candidate.
    pub fn poll_next(
        &self,
        agent_id: AgentId,
        capabilities: &CapabilitySet,
    ) -> EngineResult<Option<Task>> {
        let candidates = self.store.pending_ordered().map_err(store_error)?;

        for candidate in candidates {
            // Capability mismatch is decidable without touching the store
            // again; skip before paying for the dependency fetch.
            if !candidate.required_capabilities.is_subset_of(capabilities) {
                continue;
            }

            let dependency_statuses = if candidate.dependencies.is_empty() {
                HashMap::new()
            } else {
                self.store
                    .dependency_statuses(&candidate.dependencies)
                    .map_err(store_error)?
            };

            if !is_eligible(&candidate, capabilities, &dependency_statuses) {
                continue;
            }

            match self
                .store
                .try_claim(candidate.id, agent_id, Utc::now())
                .map_err(store_error)?
            {
                Some(claimed) => {
                    info!(task_id = %claimed.id, agent_id = %agent_id, "task assigned");
                    return Ok(Some(claimed));
                }
                None => {
                    debug!(task_id = %candidate.id, "lost claim race, continuing scan");
                    continue;
                }
            }
        }

        Ok(None)
    }

    /// Report that the owning agent has begun work (`Assigned → InProgress`).
    pub fn start(&self, task_id: TaskId, agent_id: AgentId) -> EngineResult<Task> {
        if let Some(task) = self
            .store
            .try_start(task_id, agent_id)
            .map_err(store_error)?
        {
            return Ok(task);
        }

        // The conditional write matched nothing; read back to say why.
        let current = self.get(task_id)?;
        match current.assigned_agent_id {
            Some(owner) if owner == agent_id => Err(EngineError::invalid_state(
                current.status.as_str(),
                "start",
            )),
            _ => Err(EngineError::NotAssigned),
        }
    }

    /// Terminal success: record `output_data` and notify the completion
    /// observer. Observer failures never propagate.
    pub fn complete(
        &self,
        task_id: TaskId,
        agent_id: AgentId,
        output_data: JsonValue,
    ) -> EngineResult<Task> {
        let task = self.dispose(task_id, agent_id, TaskDisposition::Completed(output_data))?;
        if let Some(observer) = &self.observer {
            observer.on_task_completed(&task);
        }
        Ok(task)
    }

    /// Terminal failure: record `error_message`. Failed tasks are not
    /// retried at this layer; a retry is a new task.
    pub fn fail(
        &self,
        task_id: TaskId,
        agent_id: AgentId,
        error_message: String,
    ) -> EngineResult<Task> {
        self.dispose(task_id, agent_id, TaskDisposition::Failed(error_message))
    }

    /// Cancel a task that nobody has claimed yet (`Pending → Cancelled`).
    pub fn cancel(&self, task_id: TaskId) -> EngineResult<Task> {
        if let Some(task) = self.store.try_cancel(task_id).map_err(store_error)? {
            info!(task_id = %task.id, "task cancelled");
            return Ok(task);
        }
        let current = self.get(task_id)?;
        Err(EngineError::invalid_state(current.status.as_str(), "cancel"))
    }

    fn dispose(
        &self,
        task_id: TaskId,
        agent_id: AgentId,
        disposition: TaskDisposition,
    ) -> EngineResult<Task> {
        let action = disposition.action();

        // Pre-check against a snapshot for a precise error, then apply the
        // conditional write; the write re-validates atomically.
        let current = self.get(task_id)?;
        current.check_disposition(agent_id, action)?;

        match self
            .store
            .try_finish(task_id, agent_id, disposition, Utc::now())
            .map_err(store_error)?
        {
            Some(task) => {
                info!(
                    task_id = %task.id,
                    agent_id = %agent_id,
                    status = %task.status,
                    "task finished"
                );
                Ok(task)
            }
            None => {
                // Raced between snapshot and write; re-read for the real reason.
                let fresh = self.get(task_id)?;
                match fresh.check_disposition(agent_id, action) {
                    Err(err) => Err(err),
                    Ok(()) => Err(EngineError::storage("task changed concurrently")),
                }
            }
        }
    }
}

fn store_error(e: TaskStoreError) -> EngineError {
    match e {
        TaskStoreError::AlreadyExists(id) => {
            EngineError::validation(format!("task already exists: {id}"))
        }
        TaskStoreError::Storage(msg) => EngineError::storage(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use conductor_core::ProjectId;
    use conductor_tasks::TaskStatus;
    use serde_json::json;

    use crate::task_store::InMemoryTaskStore;

    fn service() -> AssignmentService<Arc<InMemoryTaskStore>> {
        AssignmentService::new(Arc::new(InMemoryTaskStore::new()))
    }

    fn new_task(project: ProjectId) -> NewTask {
        NewTask {
            project_id: project,
            title: "work".to_string(),
            description: None,
            priority: 0,
            dependencies: Vec::new(),
            required_capabilities: CapabilitySet::new(),
        }
    }

    #[test]
    fn poll_returns_none_on_empty_backlog() {
        let svc = service();
        let got = svc.poll_next(AgentId::new(), &CapabilitySet::new()).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn poll_prefers_high_priority_then_age() {
        let svc = service();
        let project = ProjectId::new();

        let mut low = new_task(project);
        low.priority = 1;
        let low = svc.create(low).unwrap();
        let mut high = new_task(project);
        high.priority = 9;
        let high = svc.create(high).unwrap();

        let agent = AgentId::new();
        let first = svc.poll_next(agent, &CapabilitySet::new()).unwrap().unwrap();
        assert_eq!(first.id, high.id);
        assert_eq!(first.status, TaskStatus::Assigned);
        assert_eq!(first.assigned_agent_id, Some(agent));

        let second = svc.poll_next(agent, &CapabilitySet::new()).unwrap().unwrap();
        assert_eq!(second.id, low.id);
    }

    #[test]
    fn poll_skips_capability_mismatches() {
        let svc = service();
        let project = ProjectId::new();

        let mut gated = new_task(project);
        gated.priority = 9;
        gated.required_capabilities = ["review"].into_iter().collect();
        svc.create(gated).unwrap();
        let open = svc.create(new_task(project)).unwrap();

        let got = svc
            .poll_next(AgentId::new(), &["coding"].into_iter().collect())
            .unwrap()
            .unwrap();
        assert_eq!(got.id, open.id);
    }

    #[test]
    fn poll_never_returns_dependency_blocked_tasks() {
        let svc = service();
        let project = ProjectId::new();
        let agent = AgentId::new();

        let dep = svc.create(new_task(project)).unwrap();
        let mut blocked = new_task(project);
        blocked.priority = 100;
        blocked.dependencies = vec![dep.id];
        let blocked = svc.create(blocked).unwrap();

        // The dependency is still pending, so only the dependency itself is
        // assignable, despite the blocked task's higher priority.
        let got = svc.poll_next(agent, &CapabilitySet::new()).unwrap().unwrap();
        assert_eq!(got.id, dep.id);
        assert!(svc.poll_next(agent, &CapabilitySet::new()).unwrap().is_none());

        svc.complete(dep.id, agent, json!({})).unwrap();
        let got = svc.poll_next(agent, &CapabilitySet::new()).unwrap().unwrap();
        assert_eq!(got.id, blocked.id);
    }

    #[test]
    fn concurrent_polls_get_distinct_tasks() {
        let store = Arc::new(InMemoryTaskStore::new());
        let svc = Arc::new(AssignmentService::new(store));
        let project = ProjectId::new();

        let n_agents = 8;
        for _ in 0..n_agents {
            svc.create(new_task(project)).unwrap();
        }

        let claimed: Vec<Option<TaskId>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..n_agents)
                .map(|_| {
                    let svc = Arc::clone(&svc);
                    scope.spawn(move || {
                        svc.poll_next(AgentId::new(), &CapabilitySet::new())
                            .unwrap()
                            .map(|t| t.id)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ids: Vec<TaskId> = claimed.into_iter().flatten().collect();
        assert_eq!(ids.len(), n_agents, "every poller should win some task");
        let distinct: HashSet<TaskId> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), n_agents, "no task may be assigned twice");
    }

    #[test]
    fn complete_rejects_non_owner() {
        let svc = service();
        let task = svc.create(new_task(ProjectId::new())).unwrap();
        let owner = AgentId::new();
        svc.poll_next(owner, &CapabilitySet::new()).unwrap().unwrap();

        let err = svc.complete(task.id, AgentId::new(), json!({})).unwrap_err();
        assert_eq!(err, EngineError::NotAssigned);
    }

    #[test]
    fn complete_rejects_terminal_states() {
        let svc = service();
        let task = svc.create(new_task(ProjectId::new())).unwrap();
        let owner = AgentId::new();
        svc.poll_next(owner, &CapabilitySet::new()).unwrap().unwrap();
        svc.complete(task.id, owner, json!({})).unwrap();

        let err = svc.fail(task.id, owner, "too late".to_string()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn unknown_task_is_not_found() {
        let svc = service();
        let err = svc
            .complete(TaskId::new(), AgentId::new(), json!({}))
            .unwrap_err();
        assert_eq!(err, EngineError::NotFound);
    }

    #[test]
    fn start_then_complete_from_in_progress() {
        let svc = service();
        let task = svc.create(new_task(ProjectId::new())).unwrap();
        let owner = AgentId::new();
        svc.poll_next(owner, &CapabilitySet::new()).unwrap().unwrap();

        let started = svc.start(task.id, owner).unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);

        // Starting twice is an invalid transition for the owner...
        let err = svc.start(task.id, owner).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
        // ...and NotAssigned for anyone else.
        assert_eq!(
            svc.start(task.id, AgentId::new()).unwrap_err(),
            EngineError::NotAssigned
        );

        let done = svc.complete(task.id, owner, json!({"ok": true})).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[test]
    fn cancel_is_pending_only() {
        let svc = service();
        let task = svc.create(new_task(ProjectId::new())).unwrap();
        svc.cancel(task.id).unwrap();

        let again = svc.create(new_task(ProjectId::new())).unwrap();
        svc.poll_next(AgentId::new(), &CapabilitySet::new())
            .unwrap()
            .unwrap();
        let err = svc.cancel(again.id).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[test]
    fn completion_notifies_observer_once() {
        struct Counting(AtomicUsize);
        impl CompletionObserver for Counting {
            fn on_task_completed(&self, _task: &Task) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let observer = Arc::new(Counting(AtomicUsize::new(0)));
        let svc = AssignmentService::new(Arc::new(InMemoryTaskStore::new()))
            .with_observer(observer.clone());

        let task = svc.create(new_task(ProjectId::new())).unwrap();
        let owner = AgentId::new();
        svc.poll_next(owner, &CapabilitySet::new()).unwrap().unwrap();
        svc.complete(task.id, owner, json!({})).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);

        // Failure does not notify.
        let failing = svc.create(new_task(ProjectId::new())).unwrap();
        svc.poll_next(owner, &CapabilitySet::new()).unwrap().unwrap();
        svc.fail(failing.id, owner, "broken".to_string()).unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }
}
