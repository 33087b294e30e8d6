//! Execution contexts backed by tokio's blocking pool.
//!
//! For hosts without dedicated worker threads. A context is a logical slot:
//! the scheduler still binds one task per context, and each task still
//! crosses an encode/decode boundary, but the work runs on a pooled
//! blocking thread.

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::core::{Execution, FunctionRegistry, PoolError, WireTask};

use super::{run_wire_task, ContextAdapter, ContextId, ExecuteOptions, ExecutionContext};

/// Adapter creating cooperative task contexts.
#[derive(Debug, Clone)]
pub struct TaskAdapter {
    registry: FunctionRegistry,
}

impl TaskAdapter {
    /// Create an adapter resolving functions in `registry`.
    #[must_use]
    pub const fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ContextAdapter for TaskAdapter {
    fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig::Task
    }

    fn is_supported(&self) -> bool {
        true
    }

    async fn create_context(&self, id: ContextId) -> Result<Box<dyn ExecutionContext>, PoolError> {
        debug!(context_id = id, "task context created");
        Ok(Box::new(TaskContext {
            id,
            registry: self.registry.clone(),
            terminated: false,
        }))
    }
}

struct TaskContext {
    id: ContextId,
    registry: FunctionRegistry,
    terminated: bool,
}

#[async_trait]
impl ExecutionContext for TaskContext {
    fn id(&self) -> ContextId {
        self.id
    }

    async fn execute(
        &mut self,
        task: &WireTask,
        options: ExecuteOptions,
    ) -> Result<Execution, PoolError> {
        if self.terminated {
            return Err(PoolError::ContextLost(format!(
                "context {} was terminated",
                self.id
            )));
        }
        let payload = task.encode()?;
        let registry = self.registry.clone();
        let started = Instant::now();
        debug!(
            context_id = self.id,
            task_id = options.task_id,
            timeout = ?options.timeout,
            "task handed to blocking pool"
        );

        let value = tokio::task::spawn_blocking(move || run_wire_task(&registry, &payload))
            .await
            .map_err(|e| PoolError::ContextLost(e.to_string()))??;

        Ok(Execution {
            value,
            duration: started.elapsed(),
        })
    }

    async fn terminate(&mut self) {
        self.terminated = true;
        debug!(context_id = self.id, "task context terminated");
    }
}
