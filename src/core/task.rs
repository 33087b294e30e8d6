//! Task envelopes, options, and payload validation.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::PoolError;

/// Unique task identifier within one pool.
pub type TaskId = u64;

/// Maximum nesting depth accepted in an argument payload.
pub const MAX_PAYLOAD_DEPTH: usize = 128;

/// Task priority used for queue ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Dispatched after everything else.
    Low,
    /// Default tier.
    #[default]
    Normal,
    /// Dispatched before normal and low.
    High,
}

/// Lifecycle state of a task envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the pool queue.
    Queued,
    /// Bound to an execution context.
    Dispatched,
    /// Finished with a result.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Caller's abort signal fired.
    Aborted,
    /// Deadline expired.
    TimedOut,
}

impl TaskState {
    /// Terminal state corresponding to a finished attempt.
    #[must_use]
    pub fn from_result<T>(result: &Result<T, PoolError>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(PoolError::Aborted) => Self::Aborted,
            Err(PoolError::Timeout(_)) => Self::TimedOut,
            Err(_) => Self::Failed,
        }
    }
}

/// Per-task execution options.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Deadline for each attempt. Falls back to the pool default.
    pub timeout: Option<Duration>,
    /// Queue priority.
    pub priority: Priority,
    /// Cancels the caller's wait when fired.
    pub signal: Option<CancellationToken>,
    /// Retries after the first attempt. Falls back to the pool default.
    pub max_retries: Option<u32>,
    /// Pre-warm the pool to at least this many contexts before queueing.
    pub pool_size_hint: Option<usize>,
}

impl TaskOptions {
    /// Create default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the queue priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach an abort signal.
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the pool size hint.
    #[must_use]
    pub fn with_pool_size_hint(mut self, hint: usize) -> Self {
        self.pool_size_hint = Some(hint);
        self
    }

    /// Reject malformed option values.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for a zero timeout or a zero size hint.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(PoolError::InvalidArgument("timeout must be greater than 0".into()));
        }
        if self.pool_size_hint == Some(0) {
            return Err(PoolError::InvalidArgument(
                "pool_size_hint must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// The transport form of a task: a registered function name plus JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTask {
    /// Name of a function in the pool's registry.
    pub function: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl WireTask {
    /// Encode for crossing an isolation boundary.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Serialization` if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, PoolError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a task received across an isolation boundary.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Serialization` if the bytes are not a valid task.
    pub fn decode(bytes: &[u8]) -> Result<Self, PoolError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A caller's request to run one registered function.
///
/// Arguments are serialized as they are added; a serialization failure is held
/// and reported when the request is submitted.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub(crate) function: String,
    pub(crate) args: Result<Vec<Value>, PoolError>,
    pub(crate) options: TaskOptions,
}

impl TaskRequest {
    /// Start a request for the named function with no arguments.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Ok(Vec::new()),
            options: TaskOptions::default(),
        }
    }

    /// Build a request from already-encoded arguments.
    pub fn with_values(function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            args: Ok(args),
            options: TaskOptions::default(),
        }
    }

    /// Append one serializable argument.
    #[must_use]
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if let Ok(args) = self.args.as_mut() {
            match serde_json::to_value(value) {
                Ok(value) => args.push(value),
                Err(e) => self.args = Err(e.into()),
            }
        }
        self
    }

    /// Replace the execution options.
    #[must_use]
    pub fn options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the queue priority.
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Attach an abort signal.
    #[must_use]
    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.options.signal = Some(signal);
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = Some(max_retries);
        self
    }

    /// Function name this request targets.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }
}

/// Reject payloads nested deeper than [`MAX_PAYLOAD_DEPTH`].
///
/// # Errors
///
/// Returns `PoolError::Serialization` naming the offending argument.
pub fn validate_payload(args: &[Value]) -> Result<(), PoolError> {
    for (index, arg) in args.iter().enumerate() {
        if depth(arg) > MAX_PAYLOAD_DEPTH {
            return Err(PoolError::Serialization(format!(
                "argument {index} exceeds maximum nesting depth of {MAX_PAYLOAD_DEPTH}"
            )));
        }
    }
    Ok(())
}

fn depth(value: &Value) -> usize {
    // Iterative so hostile payloads cannot blow the stack.
    let mut max = 0;
    let mut stack = vec![(value, 1usize)];
    while let Some((value, level)) = stack.pop() {
        max = max.max(level);
        match value {
            Value::Array(items) => stack.extend(items.iter().map(|v| (v, level + 1))),
            Value::Object(map) => stack.extend(map.values().map(|v| (v, level + 1))),
            _ => {}
        }
    }
    max
}

/// Outcome of running a wire task in a context.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Function result.
    pub value: Value,
    /// Time spent inside the context.
    pub duration: Duration,
}

/// A queued unit of work paired with its completion channel.
#[derive(Debug)]
pub(crate) struct TaskEnvelope {
    pub id: TaskId,
    pub wire: WireTask,
    pub priority: Priority,
    pub state: TaskState,
    pub created_at: Instant,
    pub timeout: Option<Duration>,
    pub reply: oneshot::Sender<Result<Execution, PoolError>>,
}

impl TaskEnvelope {
    /// Whether the submitting caller stopped waiting (abort or timeout).
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    /// Deliver the terminal outcome; a caller that already left is ignored.
    pub fn complete(self, outcome: Result<Execution, PoolError>) {
        let _ = self.reply.send(outcome);
    }
}
