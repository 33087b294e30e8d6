//! Error types for scheduler, controller, and array operations.

use thiserror::Error;

/// Errors produced by the pool, its execution contexts, and the operations built on top.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Unknown function, malformed options, or otherwise unusable input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The payload cannot be represented in the transport format.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Admission rejected because the bounded queue is saturated.
    #[error("task queue is full (limit {limit})")]
    QueueFull {
        /// Configured queue size limit.
        limit: usize,
    },

    /// The pool is shutting down and no longer accepts or runs work.
    #[error("pool is terminating")]
    PoolTerminating,

    /// An attempt exceeded its deadline.
    #[error("task timed out after {0} ms")]
    Timeout(u64),

    /// The caller's abort signal fired.
    #[error("task aborted")]
    Aborted,

    /// The task function itself failed inside the execution context.
    #[error("task execution failed: {0}")]
    Execution(String),

    /// An execution context could not be created.
    #[error("execution context creation failed: {0}")]
    AdapterCreation(String),

    /// The execution context died while holding a task.
    #[error("execution context lost: {0}")]
    ContextLost(String),

    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// One or more tasks of a `parallel` call failed.
    #[error("{} of {total} tasks failed: {}", .failures.len(), .failures.join("; "))]
    Aggregate {
        /// Number of tasks in the call.
        total: usize,
        /// Error message of every failed task, in task order.
        failures: Vec<String>,
    },
}

impl PoolError {
    /// Whether the retry loop may re-run an attempt that failed with this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Execution(_) | Self::ContextLost(_))
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
