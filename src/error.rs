//! Scheduler errors

use thiserror::Error;

/// Scheduler result
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced by task registration and configuration.
///
/// Runtime failures (a panicking `init`/`step`/`on_done`) are not represented
/// here: they are isolated per task, logged, and recorded as
/// [`TaskState::Failed`](crate::scheduler::TaskState::Failed) so one faulty
/// task cannot stall the dispatch loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("task priority must be a positive integer, got {0}")]
    InvalidPriority(u32),

    #[error("task batch size must be at least 1")]
    InvalidBatch,

    #[error("task spec `{name}` is missing its `{hook}` hook")]
    MissingHook { name: String, hook: &'static str },
}
