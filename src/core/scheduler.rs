//! Pool scheduler: owns execution contexts, queues tasks by priority, and
//! scales contexts between `min_workers` and the current size limit.
//!
//! All pool state sits behind one mutex that is never held across an await.
//! Dispatch is a plain function that pairs idle contexts with queued tasks and
//! spawns the execution; every completion, creation, and enqueue re-runs it.
//! Statistics are published into atomics at the end of each locked section so
//! [`Scheduler::stats`] never takes the lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PoolConfig, RuntimeConfig};
use crate::runtime::{select_adapter, ContextAdapter, ContextId, ExecuteOptions, ExecutionContext};

use super::control::ExecutionControl;
use super::events::{EventSink, PoolEvent};
use super::queue::TaskQueue;
use super::registry::FunctionRegistry;
use super::task::{
    validate_payload, Execution, Priority, TaskEnvelope, TaskId, TaskRequest, TaskState, WireTask,
};
use super::PoolError;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Contexts currently executing a task.
    pub active_workers: usize,
    /// Contexts waiting for work.
    pub idle_workers: usize,
    /// Tasks waiting for a context.
    pub queued_tasks: usize,
    /// Tasks that finished successfully.
    pub completed_tasks: u64,
    /// Task executions that ended in an error.
    pub failed_tasks: u64,
    /// Mean time spent inside a context over all executions.
    pub average_execution_time: Duration,
    /// Current ceiling on the number of contexts.
    pub size_limit: usize,
}

impl PoolStats {
    /// Total live contexts.
    #[must_use]
    pub const fn total_workers(&self) -> usize {
        self.active_workers + self.idle_workers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextStatus {
    Idle,
    Busy,
}

struct ContextSlot {
    status: ContextStatus,
    /// Taken out while a task runs on it.
    context: Option<Box<dyn ExecutionContext>>,
    idle_timer: Option<AbortHandle>,
    running: Option<AbortHandle>,
}

impl ContextSlot {
    fn new(context: Box<dyn ExecutionContext>) -> Self {
        Self {
            status: ContextStatus::Idle,
            context: Some(context),
            idle_timer: None,
            running: None,
        }
    }
}

struct PoolState {
    queue: TaskQueue<TaskEnvelope>,
    contexts: HashMap<ContextId, ContextSlot>,
    /// Idle context ids; the most recently released is reused first.
    idle: Vec<ContextId>,
    /// Context creations in flight.
    creating: usize,
    size_limit: usize,
    accepting: bool,
}

impl PoolState {
    fn busy(&self) -> usize {
        self.contexts.len().saturating_sub(self.idle.len())
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    active: AtomicUsize,
    idle: AtomicUsize,
    queued: AtomicUsize,
    size_limit: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    execution_nanos: AtomicU64,
}

struct Inner {
    id: Uuid,
    config: PoolConfig,
    adapter: Arc<dyn ContextAdapter>,
    registry: FunctionRegistry,
    handle: Handle,
    state: Mutex<PoolState>,
    counters: PoolCounters,
    events: Option<Arc<dyn EventSink>>,
    drained: Notify,
    next_task_id: AtomicU64,
    next_context_id: AtomicU64,
}

/// A pool of execution contexts with a priority queue in front of it.
///
/// Cloning is cheap and every clone drives the same pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.inner.id)
            .field("runtime", &self.inner.adapter.runtime())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a pool using the adapter selected by `config.runtime`.
    ///
    /// Contexts are created lazily; call [`Scheduler::warm_up`] to pre-create
    /// `min_workers` of them.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if the configuration is invalid, the runtime
    /// is unsupported, or no tokio runtime is running.
    pub fn new(config: PoolConfig, registry: FunctionRegistry) -> Result<Self, PoolError> {
        let adapter = select_adapter(&config, registry.clone())?;
        Self::with_adapter(config, registry, adapter, None)
    }

    /// Create a pool with an explicit adapter and optional event sink.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if the configuration is invalid or no tokio
    /// runtime is running.
    pub fn with_adapter(
        config: PoolConfig,
        registry: FunctionRegistry,
        adapter: Arc<dyn ContextAdapter>,
        events: Option<Arc<dyn EventSink>>,
    ) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let handle = Handle::try_current().map_err(|_| {
            PoolError::InvalidConfig("a scheduler must be created inside a tokio runtime".into())
        })?;

        let state = PoolState {
            queue: TaskQueue::new(),
            contexts: HashMap::new(),
            idle: Vec::new(),
            creating: 0,
            size_limit: config.max_workers,
            accepting: true,
        };
        let counters = PoolCounters::default();
        counters.size_limit.store(config.max_workers, Ordering::Relaxed);

        let id = Uuid::new_v4();
        info!(
            pool_id = %id,
            runtime = ?adapter.runtime(),
            min_workers = config.min_workers,
            max_workers = config.max_workers,
            "pool created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                config,
                adapter,
                registry,
                handle,
                state: Mutex::new(state),
                counters,
                events,
                drained: Notify::new(),
                next_task_id: AtomicU64::new(1),
                next_context_id: AtomicU64::new(0),
            }),
        })
    }

    /// Pool identifier used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Registry tasks are resolved against.
    #[must_use]
    pub fn registry(&self) -> &FunctionRegistry {
        &self.inner.registry
    }

    /// Runtime of the selected adapter.
    #[must_use]
    pub fn runtime(&self) -> RuntimeConfig {
        self.inner.adapter.runtime()
    }

    /// Whether the selected adapter can run on this host.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.inner.adapter.is_supported()
    }

    /// Whether the pool still accepts submissions.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.inner.state.lock().accepting
    }

    /// Snapshot of pool statistics. Never blocks on pool state.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        let completed = c.completed.load(Ordering::Relaxed);
        let failed = c.failed.load(Ordering::Relaxed);
        let executions = completed + failed;
        let average_execution_time = if executions == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(c.execution_nanos.load(Ordering::Relaxed) / executions)
        };
        PoolStats {
            active_workers: c.active.load(Ordering::Relaxed),
            idle_workers: c.idle.load(Ordering::Relaxed),
            queued_tasks: c.queued.load(Ordering::Relaxed),
            completed_tasks: completed,
            failed_tasks: failed,
            average_execution_time,
            size_limit: c.size_limit.load(Ordering::Relaxed),
        }
    }

    /// Submit one task and wait for its result.
    ///
    /// Validation happens before anything is queued. The timeout covers each
    /// attempt from enqueue to result; retries re-enqueue immediately.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` or `Serialization` for rejected input,
    /// `PoolTerminating` once shutdown began, `QueueFull` under backpressure,
    /// `Aborted`, `Timeout`, `Execution`, or `ContextLost`.
    pub async fn submit(&self, request: TaskRequest) -> Result<Value, PoolError> {
        let TaskRequest {
            function,
            args,
            options,
        } = request;
        let args = args?;
        if !self.inner.registry.contains(&function) {
            return Err(PoolError::InvalidArgument(format!(
                "function `{function}` is not registered"
            )));
        }
        validate_payload(&args)?;
        options.validate()?;
        if !self.is_accepting() {
            return Err(PoolError::PoolTerminating);
        }
        if let Some(hint) = options.pool_size_hint {
            self.inner.prewarm(hint);
        }

        let config = &self.inner.config;
        let control =
            ExecutionControl::from_options(&options, config.default_timeout(), config.default_max_retries);
        let timeout = options.timeout.or_else(|| config.default_timeout());
        let wire = WireTask { function, args };
        let last_task = AtomicU64::new(0);
        let submitted = Instant::now();

        let result = control
            .run(|_| self.attempt(&wire, options.priority, timeout, &last_task))
            .await;

        // Abort and timeout end the caller's wait, not the execution, so the
        // run task never sees them.
        if let Err(err @ (PoolError::Timeout(_) | PoolError::Aborted)) = &result {
            let task_id = last_task.load(Ordering::Relaxed);
            if task_id != 0 {
                self.inner.emit(PoolEvent::TaskError {
                    task_id,
                    error: err.to_string(),
                    state: TaskState::from_result(&result),
                    duration: submitted.elapsed(),
                });
            }
        }
        result
    }

    /// Submit a task and deserialize its result.
    ///
    /// # Errors
    ///
    /// Everything [`Scheduler::submit`] returns, plus `Serialization` if the
    /// result does not fit `R`.
    pub async fn run<R: DeserializeOwned>(&self, request: TaskRequest) -> Result<R, PoolError> {
        let value = self.submit(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn attempt(
        &self,
        wire: &WireTask,
        priority: Priority,
        timeout: Option<Duration>,
        last_task: &AtomicU64,
    ) -> Result<Value, PoolError> {
        let task_id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        last_task.store(task_id, Ordering::Relaxed);
        let reply = self.inner.enqueue(task_id, wire.clone(), priority, timeout)?;
        match reply.await {
            Ok(outcome) => outcome.map(|execution| execution.value),
            // The run task was cancelled by terminate.
            Err(_) => Err(PoolError::PoolTerminating),
        }
    }

    /// Change the context ceiling, clamped to `[min_workers, max_workers]`.
    ///
    /// Growing creates contexts eagerly. Shrinking destroys idle contexts
    /// first; busy ones retire as they finish. Returns the clamped size.
    ///
    /// # Errors
    ///
    /// `PoolError::PoolTerminating` after shutdown began.
    pub async fn resize(&self, size: usize) -> Result<usize, PoolError> {
        let inner = &self.inner;
        let target = size.clamp(inner.config.min_workers, inner.config.max_workers);

        let (old, retired, to_create) = {
            let mut state = inner.state.lock();
            if !state.accepting {
                return Err(PoolError::PoolTerminating);
            }
            let old = state.contexts.len();
            state.size_limit = target;

            let mut retired = Vec::new();
            let mut to_create = 0;
            let planned = state.contexts.len() + state.creating;
            if target > planned {
                to_create = target - planned;
                state.creating += to_create;
            } else {
                let mut excess = state.contexts.len().saturating_sub(target);
                while excess > 0 {
                    let Some(id) = state.idle.pop() else {
                        break;
                    };
                    if let Some(mut slot) = state.contexts.remove(&id) {
                        if let Some(timer) = slot.idle_timer.take() {
                            timer.abort();
                        }
                        retired.extend(slot.context.take());
                    }
                    excess -= 1;
                }
            }
            inner.publish(&state);
            (old, retired, to_create)
        };

        join_all(retired.into_iter().map(|mut context| async move {
            context.terminate().await;
        }))
        .await;
        join_all((0..to_create).map(|_| inner.create_context())).await;

        let new = inner.state.lock().contexts.len();
        info!(pool_id = %inner.id, old, new, size_limit = target, "pool resized");
        if old != new {
            inner.emit(PoolEvent::PoolResize {
                old_size: old,
                new_size: new,
            });
        }
        inner.dispatch();
        Ok(target)
    }

    /// Create contexts until `min_workers` exist. Returns the live context count.
    pub async fn warm_up(&self) -> usize {
        let inner = &self.inner;
        let to_create = {
            let mut state = inner.state.lock();
            if !state.accepting {
                return state.contexts.len();
            }
            let planned = state.contexts.len() + state.creating;
            let missing = inner.config.min_workers.saturating_sub(planned);
            state.creating += missing;
            missing
        };
        join_all((0..to_create).map(|_| inner.create_context())).await;
        let count = inner.state.lock().contexts.len();
        debug!(pool_id = %inner.id, contexts = count, "pool warmed up");
        count
    }

    /// Shut the pool down.
    ///
    /// Stops accepting work, rejects every queued task with `PoolTerminating`,
    /// waits up to the grace period for running tasks, then destroys all
    /// contexts. Calling it again is a no-op.
    pub async fn terminate(&self) {
        let inner = &self.inner;
        let (rejected, old) = {
            let mut state = inner.state.lock();
            if !state.accepting {
                return;
            }
            state.accepting = false;
            let rejected = state.queue.drain();
            inner.publish(&state);
            (rejected, state.contexts.len())
        };
        info!(pool_id = %inner.id, rejected = rejected.len(), "terminating pool");
        for envelope in rejected {
            envelope.complete(Err(PoolError::PoolTerminating));
        }

        if tokio::time::timeout(inner.config.terminate_grace(), inner.wait_until_idle())
            .await
            .is_err()
        {
            warn!(pool_id = %inner.id, "grace period elapsed with tasks still running");
        }

        let (contexts, running) = {
            let mut state = inner.state.lock();
            state.idle.clear();
            let mut contexts = Vec::new();
            let mut running = Vec::new();
            for (_, mut slot) in state.contexts.drain() {
                if let Some(timer) = slot.idle_timer.take() {
                    timer.abort();
                }
                running.extend(slot.running.take());
                contexts.extend(slot.context.take());
            }
            inner.publish(&state);
            (contexts, running)
        };
        for handle in running {
            handle.abort();
        }
        join_all(contexts.into_iter().map(|mut context| async move {
            context.terminate().await;
        }))
        .await;

        if old > 0 {
            inner.emit(PoolEvent::PoolResize {
                old_size: old,
                new_size: 0,
            });
        }
        info!(pool_id = %inner.id, "pool terminated");
    }
}

impl Inner {
    fn emit(&self, event: PoolEvent) {
        if let Some(sink) = &self.events {
            sink.record(event);
        }
    }

    fn publish(&self, state: &PoolState) {
        let c = &self.counters;
        c.active.store(state.busy(), Ordering::Relaxed);
        c.idle.store(state.idle.len(), Ordering::Relaxed);
        c.queued.store(state.queue.len(), Ordering::Relaxed);
        c.size_limit.store(state.size_limit, Ordering::Relaxed);
    }

    fn enqueue(
        self: &Arc<Self>,
        task_id: TaskId,
        wire: WireTask,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<Result<Execution, PoolError>>, PoolError> {
        let (reply, receiver) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if !state.accepting {
                return Err(PoolError::PoolTerminating);
            }
            let limit = self.config.queue_size_limit;
            if state.queue.len() >= limit {
                let pruned = state.queue.prune(TaskEnvelope::is_abandoned);
                if pruned > 0 {
                    debug!(pool_id = %self.id, pruned, "dropped abandoned tasks from full queue");
                }
                if state.queue.len() >= limit {
                    self.publish(&state);
                    warn!(pool_id = %self.id, limit, "queue full, rejecting task");
                    return Err(PoolError::QueueFull { limit });
                }
            }
            state.queue.push(TaskEnvelope {
                id: task_id,
                wire,
                priority,
                state: TaskState::Queued,
                created_at: Instant::now(),
                timeout,
                reply,
            });
            self.publish(&state);
        }
        debug!(pool_id = %self.id, task_id, ?priority, "task queued");
        self.dispatch();
        Ok(receiver)
    }

    /// Pair idle contexts with queued tasks, then grow for whatever is left.
    fn dispatch(self: &Arc<Self>) {
        let mut state = self.state.lock();
        while !state.queue.is_empty() {
            let Some(context_id) = state.idle.pop() else {
                self.grow_for_queue(&mut state);
                break;
            };
            let Some(mut envelope) = state.queue.pop() else {
                state.idle.push(context_id);
                break;
            };
            if envelope.is_abandoned() {
                debug!(task_id = envelope.id, "skipping abandoned task");
                state.idle.push(context_id);
                continue;
            }
            let Some(slot) = state.contexts.get_mut(&context_id) else {
                state.queue.push(envelope);
                continue;
            };
            let Some(context) = slot.context.take() else {
                state.queue.push(envelope);
                continue;
            };
            if let Some(timer) = slot.idle_timer.take() {
                timer.abort();
            }
            slot.status = ContextStatus::Busy;
            envelope.state = TaskState::Dispatched;
            let run = self
                .handle
                .spawn(Arc::clone(self).execute(context_id, context, envelope));
            slot.running = Some(run.abort_handle());
        }
        self.publish(&state);
    }

    fn grow_for_queue(self: &Arc<Self>, state: &mut PoolState) {
        while state.creating < state.queue.len()
            && state.contexts.len() + state.creating < state.size_limit
        {
            state.creating += 1;
            self.handle.spawn(Arc::clone(self).create_then_dispatch());
        }
    }

    /// Start background creations up to `hint`, bounded by the size limit.
    fn prewarm(self: &Arc<Self>, hint: usize) {
        let mut state = self.state.lock();
        if !state.accepting {
            return;
        }
        let target = hint.min(state.size_limit);
        while state.contexts.len() + state.creating < target {
            state.creating += 1;
            self.handle.spawn(Arc::clone(self).create_then_dispatch());
        }
    }

    async fn create_then_dispatch(self: Arc<Self>) {
        if !self.create_context().await {
            // Creation failures are retried on the next dispatch.
            tokio::time::sleep(self.config.creation_backoff()).await;
        }
        self.dispatch();
    }

    /// Create one context whose slot the caller already counted in `creating`.
    async fn create_context(self: &Arc<Self>) -> bool {
        let id = self.next_context_id.fetch_add(1, Ordering::Relaxed);
        let created = self.adapter.create_context(id).await;

        let unwanted = {
            let mut state = self.state.lock();
            state.creating = state.creating.saturating_sub(1);
            match created {
                Ok(context) if state.accepting && state.contexts.len() < state.size_limit => {
                    state.contexts.insert(id, ContextSlot::new(context));
                    self.mark_idle(&mut state, id);
                    self.publish(&state);
                    debug!(pool_id = %self.id, context_id = id, contexts = state.contexts.len(), "context created");
                    None
                }
                Ok(context) => Some(context),
                Err(err) => {
                    self.publish(&state);
                    drop(state);
                    warn!(pool_id = %self.id, error = %err, "context creation failed");
                    return false;
                }
            }
        };
        match unwanted {
            Some(mut context) => {
                context.terminate().await;
                false
            }
            None => true,
        }
    }

    fn mark_idle(self: &Arc<Self>, state: &mut PoolState, id: ContextId) {
        let Some(slot) = state.contexts.get_mut(&id) else {
            return;
        };
        slot.status = ContextStatus::Idle;
        slot.running = None;

        let weak: Weak<Self> = Arc::downgrade(self);
        let idle_timeout = self.config.idle_timeout();
        let timer = self.handle.spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire_idle(id).await;
            }
        });
        if let Some(previous) = slot.idle_timer.replace(timer.abort_handle()) {
            previous.abort();
        }
        state.idle.push(id);
    }

    /// Destroy an idle context whose timer fired, unless that would go below `min_workers`.
    async fn expire_idle(self: Arc<Self>, id: ContextId) {
        let retired = {
            let mut state = self.state.lock();
            let still_idle = state
                .contexts
                .get(&id)
                .is_some_and(|slot| slot.status == ContextStatus::Idle);
            if !state.accepting || !still_idle || state.contexts.len() <= self.config.min_workers {
                None
            } else {
                let old = state.contexts.len();
                state.idle.retain(|idle| *idle != id);
                let slot = state.contexts.remove(&id);
                self.publish(&state);
                slot.and_then(|mut slot| slot.context.take())
                    .map(|context| (context, old, state.contexts.len()))
            }
        };
        if let Some((mut context, old, new)) = retired {
            debug!(pool_id = %self.id, context_id = id, "idle context expired");
            context.terminate().await;
            self.emit(PoolEvent::PoolResize {
                old_size: old,
                new_size: new,
            });
        }
    }

    async fn execute(
        self: Arc<Self>,
        context_id: ContextId,
        mut context: Box<dyn ExecutionContext>,
        envelope: TaskEnvelope,
    ) {
        debug!(
            task_id = envelope.id,
            context_id,
            state = ?envelope.state,
            waited = ?envelope.created_at.elapsed(),
            "task dispatched"
        );
        let started = Instant::now();
        let options = ExecuteOptions {
            task_id: envelope.id,
            timeout: envelope.timeout,
        };
        let outcome = context.execute(&envelope.wire, options).await;
        let lost = matches!(outcome, Err(PoolError::ContextLost(_)));

        self.record(&envelope, &outcome, started.elapsed());
        envelope.complete(outcome);

        self.release(context_id, context, lost).await;
        self.dispatch();
    }

    fn record(&self, envelope: &TaskEnvelope, outcome: &Result<Execution, PoolError>, elapsed: Duration) {
        let duration = match outcome {
            Ok(execution) => execution.duration,
            Err(_) => elapsed,
        };
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.counters.execution_nanos.fetch_add(nanos, Ordering::Relaxed);

        match outcome {
            Ok(execution) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = envelope.id, ?duration, "task completed");
                self.emit(PoolEvent::TaskComplete {
                    task_id: envelope.id,
                    result: execution.value.clone(),
                    duration,
                });
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = envelope.id, error = %err, "task failed");
                self.emit(PoolEvent::TaskError {
                    task_id: envelope.id,
                    error: err.to_string(),
                    state: TaskState::Failed,
                    duration,
                });
            }
        }
    }

    /// Return a context to the idle set, or retire it when the pool is
    /// shutting down, the context died, or the pool is above its size limit.
    async fn release(self: &Arc<Self>, id: ContextId, context: Box<dyn ExecutionContext>, lost: bool) {
        let (retired, drained) = {
            let mut state = self.state.lock();
            let retire = !state.accepting || lost || state.contexts.len() > state.size_limit;
            let retired = if retire {
                let old = state.contexts.len();
                state.contexts.remove(&id);
                Some((context, old, state.contexts.len()))
            } else {
                if let Some(slot) = state.contexts.get_mut(&id) {
                    slot.context = Some(context);
                }
                self.mark_idle(&mut state, id);
                None
            };
            self.publish(&state);
            (retired, state.busy() == 0)
        };
        if drained {
            self.drained.notify_waiters();
        }

        if let Some((mut context, old, new)) = retired {
            if lost {
                warn!(pool_id = %self.id, context_id = id, "context lost, replacing on demand");
            }
            context.terminate().await;
            if old != new && self.is_accepting() {
                self.emit(PoolEvent::PoolResize {
                    old_size: old,
                    new_size: new,
                });
            }
        }
    }

    fn is_accepting(&self) -> bool {
        self.state.lock().accepting
    }

    async fn wait_until_idle(&self) {
        loop {
            let notified = self.drained.notified();
            if self.state.lock().busy() == 0 {
                return;
            }
            notified.await;
        }
    }
}
