//! Engine error model.

use thiserror::Error;

/// Result type used across the engine layer.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Keep this focused on deterministic protocol failures (ownership,
/// lifecycle, validation). Handler failures inside the job runner are
/// recovered into retry transitions and never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A requested task/job/agent id is unknown.
    #[error("not found")]
    NotFound,

    /// Ownership mismatch: the caller is not the agent the task is assigned to.
    #[error("task is not assigned to this agent")]
    NotAssigned,

    /// A lifecycle transition was attempted from a non-permitted status.
    #[error("invalid state for {action}: {from}")]
    InvalidState { from: String, action: String },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store rejected or failed an operation.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_state(from: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidState {
            from: from.into(),
            action: action.into(),
        }
    }
}
