//! Execution-context adapters and runtime selection.
//!
//! An adapter creates isolated execution contexts; the scheduler owns them
//! and hands each one exactly one serialized task at a time. The adapter is
//! picked once at startup from [`RuntimeConfig`] instead of probing the host.

#[cfg(not(target_arch = "wasm32"))]
pub mod thread;
pub mod task;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{PoolConfig, RuntimeConfig};
use crate::core::{Execution, FunctionRegistry, PoolError, TaskId, WireTask};

#[cfg(not(target_arch = "wasm32"))]
pub use thread::ThreadAdapter;
pub use task::TaskAdapter;

/// Identifier of an execution context within one pool.
pub type ContextId = u64;

/// Per-execution information passed to a context.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Task being executed.
    pub task_id: TaskId,
    /// Deadline the scheduler is racing against, if any. Contexts only trace it.
    pub timeout: Option<Duration>,
}

/// One isolated execution unit.
#[async_trait]
pub trait ExecutionContext: Send {
    /// Context identifier.
    fn id(&self) -> ContextId;

    /// Run one task to completion.
    ///
    /// # Errors
    ///
    /// `PoolError::Serialization` if the task cannot cross the boundary,
    /// `PoolError::Execution` if the function failed, or
    /// `PoolError::ContextLost` if the context died.
    async fn execute(
        &mut self,
        task: &WireTask,
        options: ExecuteOptions,
    ) -> Result<Execution, PoolError>;

    /// Release the context. Must be idempotent.
    async fn terminate(&mut self);
}

/// Platform-specific creator of execution contexts.
#[async_trait]
pub trait ContextAdapter: Send + Sync {
    /// Runtime this adapter implements.
    fn runtime(&self) -> RuntimeConfig;

    /// Whether the host can run this adapter's contexts.
    fn is_supported(&self) -> bool;

    /// Create one context.
    ///
    /// # Errors
    ///
    /// `PoolError::AdapterCreation` when the host refuses a new context.
    async fn create_context(&self, id: ContextId) -> Result<Box<dyn ExecutionContext>, PoolError>;
}

/// Resolve the adapter for the configured runtime.
///
/// # Errors
///
/// Returns `PoolError::InvalidConfig` if the runtime is not supported on this host.
pub fn select_adapter(
    config: &PoolConfig,
    registry: FunctionRegistry,
) -> Result<Arc<dyn ContextAdapter>, PoolError> {
    let adapter: Arc<dyn ContextAdapter> = match config.runtime {
        #[cfg(not(target_arch = "wasm32"))]
        RuntimeConfig::Thread => Arc::new(ThreadAdapter::new(registry, config.thread_stack_size)),
        #[cfg(target_arch = "wasm32")]
        RuntimeConfig::Thread => {
            return Err(PoolError::InvalidConfig(
                "thread runtime is not available on wasm32".into(),
            ))
        }
        RuntimeConfig::Task => Arc::new(TaskAdapter::new(registry)),
    };
    if !adapter.is_supported() {
        return Err(PoolError::InvalidConfig(format!(
            "runtime {:?} is not supported on this host",
            config.runtime
        )));
    }
    tracing::debug!(runtime = ?config.runtime, "execution context adapter selected");
    Ok(adapter)
}

/// Decode a serialized task, resolve its function, and run it.
///
/// Panics inside the function are caught and reported as execution errors so
/// the context survives them.
pub(crate) fn run_wire_task(registry: &FunctionRegistry, payload: &[u8]) -> Result<Value, PoolError> {
    let task = WireTask::decode(payload)?;
    let function = registry.get(&task.function).ok_or_else(|| {
        PoolError::InvalidArgument(format!("function `{}` is not registered", task.function))
    })?;

    match panic::catch_unwind(AssertUnwindSafe(|| function(&task.args))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(PoolError::Execution(format!("{err:#}"))),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".into());
            Err(PoolError::Execution(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(function: &str, args: Vec<Value>) -> Vec<u8> {
        WireTask {
            function: function.into(),
            args,
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_run_wire_task() {
        let registry = FunctionRegistry::new();
        registry.register_unary("double", |x: i64| x * 2);
        let value = run_wire_task(&registry, &encoded("double", vec![json!(21)])).unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::new();
        let err = run_wire_task(&registry, &encoded("missing", vec![])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)));
    }

    #[test]
    fn test_panic_becomes_execution_error() {
        let registry = FunctionRegistry::new();
        registry.register("explode", |_| panic!("kaboom"));
        let err = run_wire_task(&registry, &encoded("explode", vec![])).unwrap_err();
        assert_eq!(err, PoolError::Execution("kaboom".into()));
    }

    #[test]
    fn test_select_adapter_matches_config() {
        let registry = FunctionRegistry::new();
        let config = PoolConfig::new().with_runtime(RuntimeConfig::Task);
        let adapter = select_adapter(&config, registry).unwrap();
        assert_eq!(adapter.runtime(), RuntimeConfig::Task);
        assert!(adapter.is_supported());
    }
}
