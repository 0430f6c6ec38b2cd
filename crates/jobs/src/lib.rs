//! `conductor-jobs` — background job model.
//!
//! A job is a retryable, typed, asynchronous unit of deferred work: a kind
//! tag routing to a handler, an opaque payload, and a bounded retry counter
//! with exponential backoff. The runner that executes jobs lives in
//! `conductor-infra`.

pub mod job;
pub mod kind;
pub mod retry;

pub use job::{Job, JobStatus};
pub use kind::JobKind;
pub use retry::RetryPolicy;
