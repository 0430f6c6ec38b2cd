//! Eligibility: the predicate gating task assignment.

use std::collections::HashMap;

use conductor_core::{CapabilitySet, TaskId};

use crate::task::{Task, TaskStatus};

/// Decide whether `task` is assignable to an agent with `agent_capabilities`,
/// given a snapshot of its dependencies' statuses.
///
/// Pure and side-effect free. The snapshot may be stale — callers re-validate
/// at claim time with a conditional write, so a false positive here costs one
/// lost claim race, never a double assignment. A dependency missing from the
/// snapshot counts as not completed.
pub fn is_eligible(
    task: &Task,
    agent_capabilities: &CapabilitySet,
    dependency_statuses: &HashMap<TaskId, TaskStatus>,
) -> bool {
    if task.status != TaskStatus::Pending {
        return false;
    }

    if !task.required_capabilities.is_subset_of(agent_capabilities) {
        return false;
    }

    task.dependencies.iter().all(|dep| {
        matches!(
            dependency_statuses.get(dep),
            Some(TaskStatus::Completed)
        )
    })
}
