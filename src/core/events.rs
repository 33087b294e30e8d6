//! Lifecycle events emitted by the scheduler for external monitoring.
//!
//! Provides a bounded in-memory sink for tests and dev, and a sink that
//! forwards events to `tracing`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::task::{TaskId, TaskState};

/// Event emitted by a pool.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// A task finished successfully inside an execution context.
    TaskComplete {
        /// Task identifier.
        task_id: TaskId,
        /// Function result.
        result: Value,
        /// Time spent executing.
        duration: Duration,
    },
    /// A task attempt ended without a result.
    TaskError {
        /// Task identifier.
        task_id: TaskId,
        /// Error message.
        error: String,
        /// Terminal state of the attempt.
        state: TaskState,
        /// Time between submission and failure.
        duration: Duration,
    },
    /// The number of execution contexts changed.
    PoolResize {
        /// Context count before the change.
        old_size: usize,
        /// Context count after the change.
        new_size: usize,
    },
}

/// Event sink abstraction.
pub trait EventSink: Send + Sync {
    /// Record an event. Called outside the pool's internal lock.
    fn record(&self, event: PoolEvent);
}

/// In-memory event sink for testing and dev.
///
/// Clones share the same buffer, so a test can keep one handle and hand
/// another to the pool.
#[derive(Clone)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<VecDeque<PoolEvent>>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: PoolEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: PoolEvent) {
        match event {
            PoolEvent::TaskComplete { task_id, duration, .. } => {
                tracing::info!(task_id, ?duration, "task-complete");
            }
            PoolEvent::TaskError {
                task_id,
                error,
                state,
                duration,
            } => {
                tracing::warn!(
                    task_id,
                    ?state,
                    %error,
                    ?duration,
                    "task-error"
                );
            }
            PoolEvent::PoolResize { old_size, new_size } => {
                tracing::info!(old_size, new_size, "pool-resize");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        for new_size in 1..=3 {
            sink.record(PoolEvent::PoolResize {
                old_size: new_size - 1,
                new_size,
            });
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            PoolEvent::PoolResize {
                old_size: 1,
                new_size: 2
            }
        );
    }

    #[test]
    fn test_clones_share_buffer() {
        let sink = InMemoryEventSink::new(8);
        let handle = sink.clone();
        sink.record(PoolEvent::PoolResize {
            old_size: 0,
            new_size: 1,
        });
        assert_eq!(handle.events().len(), 1);
    }
}
