//! Core scheduling abstractions: tasks, the function registry, retry control,
//! lifecycle events, and the pool scheduler.

pub mod control;
pub mod error;
pub mod events;
pub(crate) mod queue;
pub mod registry;
pub mod scheduler;
pub mod task;

pub use control::ExecutionControl;
pub use error::{AppResult, PoolError};
pub use events::{EventSink, InMemoryEventSink, PoolEvent, TracingEventSink};
pub use registry::{arg, FunctionRegistry, TaskFn};
pub use scheduler::{PoolStats, Scheduler};
pub use task::{
    validate_payload, Execution, Priority, TaskId, TaskOptions, TaskRequest, TaskState, WireTask,
    MAX_PAYLOAD_DEPTH,
};
