//! Execution contexts backed by dedicated OS threads.
//!
//! Each context owns one named thread that blocks on a single-slot channel.
//! Tasks arrive as encoded bytes and leave through a oneshot reply, so the
//! async side never blocks. Dropping the sender unblocks the thread and it
//! exits after its current task.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::core::{Execution, FunctionRegistry, PoolError, WireTask};

use super::{run_wire_task, ContextAdapter, ContextId, ExecuteOptions, ExecutionContext};

/// How long `terminate` waits for a worker thread to exit before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A serialized task plus the channel its result goes back on.
struct Job {
    payload: Vec<u8>,
    reply: oneshot::Sender<Result<Value, PoolError>>,
}

/// Adapter creating one OS thread per execution context.
#[derive(Debug, Clone)]
pub struct ThreadAdapter {
    registry: FunctionRegistry,
    stack_size: usize,
}

impl ThreadAdapter {
    /// Create an adapter whose threads resolve functions in `registry`.
    #[must_use]
    pub const fn new(registry: FunctionRegistry, stack_size: usize) -> Self {
        Self {
            registry,
            stack_size,
        }
    }
}

#[async_trait]
impl ContextAdapter for ThreadAdapter {
    fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig::Thread
    }

    fn is_supported(&self) -> bool {
        true
    }

    async fn create_context(&self, id: ContextId) -> Result<Box<dyn ExecutionContext>, PoolError> {
        let (jobs, inbox) = bounded::<Job>(1);
        let registry = self.registry.clone();

        let handle = thread::Builder::new()
            .name(format!("pp-worker-{id}"))
            .stack_size(self.stack_size)
            .spawn(move || worker_loop(id, &inbox, &registry))
            .map_err(|e| PoolError::AdapterCreation(e.to_string()))?;

        debug!(context_id = id, "worker thread spawned");
        Ok(Box::new(ThreadContext {
            id,
            jobs: Some(jobs),
            handle: Some(handle),
        }))
    }
}

/// Worker loop - blocking recv, no polling. Exits when the sender is dropped.
fn worker_loop(id: ContextId, inbox: &Receiver<Job>, registry: &FunctionRegistry) {
    debug!(context_id = id, "worker thread started");
    while let Ok(job) = inbox.recv() {
        let outcome = run_wire_task(registry, &job.payload);
        // The caller may have given up (abort or timeout); nothing to do then.
        let _ = job.reply.send(outcome);
    }
    debug!(context_id = id, "worker channel closed, exiting");
}

/// Context owning one worker thread.
struct ThreadContext {
    id: ContextId,
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

#[async_trait]
impl ExecutionContext for ThreadContext {
    fn id(&self) -> ContextId {
        self.id
    }

    async fn execute(
        &mut self,
        task: &WireTask,
        options: ExecuteOptions,
    ) -> Result<Execution, PoolError> {
        let payload = task.encode()?;
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| PoolError::ContextLost(format!("context {} was terminated", self.id)))?;

        let (reply, result) = oneshot::channel();
        let started = Instant::now();
        jobs.try_send(Job { payload, reply }).map_err(|e| match e {
            TrySendError::Full(_) => {
                PoolError::ContextLost(format!("context {} already holds a task", self.id))
            }
            TrySendError::Disconnected(_) => {
                PoolError::ContextLost(format!("worker thread {} exited", self.id))
            }
        })?;
        debug!(
            context_id = self.id,
            task_id = options.task_id,
            timeout = ?options.timeout,
            "task handed to worker thread"
        );

        let value = result.await.map_err(|_| {
            PoolError::ContextLost(format!("worker thread {} dropped the task", self.id))
        })??;

        Ok(Execution {
            value,
            duration: started.elapsed(),
        })
    }

    async fn terminate(&mut self) {
        // Dropping the sender unblocks the worker's recv().
        self.jobs = None;
        let Some(handle) = self.handle.take() else {
            return;
        };

        let join = tokio::task::spawn_blocking(move || handle.join().is_ok());
        match tokio::time::timeout(JOIN_TIMEOUT, join).await {
            Ok(Ok(true)) => debug!(context_id = self.id, "worker thread joined"),
            Ok(Ok(false)) => warn!(context_id = self.id, "worker thread panicked"),
            Ok(Err(e)) => warn!(context_id = self.id, error = %e, "failed to join worker thread"),
            Err(_) => warn!(
                context_id = self.id,
                "worker thread did not exit within timeout - detaching"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> ExecuteOptions {
        ExecuteOptions {
            task_id: 1,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[tokio::test]
    async fn test_executes_on_worker_thread() {
        let registry = FunctionRegistry::new();
        registry.register("thread_name", |_| {
            Ok(json!(thread::current().name().unwrap_or_default()))
        });
        let adapter = ThreadAdapter::new(registry, 256 * 1024);

        let mut context = adapter.create_context(7).await.unwrap();
        let execution = context
            .execute(
                &WireTask {
                    function: "thread_name".into(),
                    args: vec![],
                },
                options(),
            )
            .await
            .unwrap();
        assert_eq!(execution.value, json!("pp-worker-7"));
        context.terminate().await;
    }

    #[tokio::test]
    async fn test_context_survives_failures() {
        let registry = FunctionRegistry::new();
        registry.register("fail", |_| anyhow::bail!("nope"));
        registry.register_unary("inc", |x: i64| x + 1);
        let adapter = ThreadAdapter::new(registry, 256 * 1024);
        let mut context = adapter.create_context(1).await.unwrap();

        let failed = context
            .execute(
                &WireTask {
                    function: "fail".into(),
                    args: vec![],
                },
                options(),
            )
            .await;
        assert_eq!(failed, Err(PoolError::Execution("nope".into())));

        let ok = context
            .execute(
                &WireTask {
                    function: "inc".into(),
                    args: vec![json!(1)],
                },
                options(),
            )
            .await
            .unwrap();
        assert_eq!(ok.value, json!(2));
        context.terminate().await;
    }

    #[tokio::test]
    async fn test_execute_after_terminate() {
        let adapter = ThreadAdapter::new(FunctionRegistry::new(), 256 * 1024);
        let mut context = adapter.create_context(3).await.unwrap();
        context.terminate().await;
        context.terminate().await;
        let err = context
            .execute(
                &WireTask {
                    function: "x".into(),
                    args: vec![],
                },
                options(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::ContextLost(_)));
    }
}
