//! # Prometheus Parallel
//!
//! A worker-pool task scheduler with array operations and lazy pipelines on top.
//!
//! Callers register named functions once, then submit work by name with
//! JSON-serializable arguments. The scheduler keeps a bounded, elastic pool of
//! isolated execution contexts, queues tasks by priority, and enforces
//! timeouts, abort signals, and retries per task.
//!
//! ## Core Problem Solved
//!
//! CPU-bound work does not belong on the async executor, and spawning a thread
//! per job does not scale. This crate sits between the two:
//!
//! - **Bounded contexts**: at most `max_workers` contexts, created lazily and
//!   retired after `idle_timeout_ms` above `min_workers`
//! - **Backpressure**: a full queue rejects new work with `QueueFull` instead
//!   of blocking
//! - **Failure control**: per-task timeout, abort signal, and immediate retry
//! - **Serializable boundary**: every task crosses an encode/decode boundary,
//!   so contexts never share caller memory
//!
//! ## Scheduler
//!
//! ```rust,ignore
//! use prometheus_parallel::builders::PoolBuilder;
//! use prometheus_parallel::config::PoolConfig;
//! use prometheus_parallel::core::{FunctionRegistry, Priority, TaskRequest};
//!
//! let registry = FunctionRegistry::new();
//! registry.register_unary("square", |x: i64| x * x);
//!
//! let pool = PoolBuilder::new(registry)
//!     .with_config(PoolConfig::new().with_max_workers(4))
//!     .build()
//!     .await?;
//!
//! let nine: i64 = pool
//!     .run(TaskRequest::new("square").arg(&3).priority(Priority::High))
//!     .await?;
//! ```
//!
//! ## Array Operations and Pipelines
//!
//! ```rust,ignore
//! use prometheus_parallel::ops::BatchOptions;
//!
//! let squares: Vec<i64> = pool
//!     .map(&[1, 2, 3, 4, 5], "square", &BatchOptions::new().with_batch_size(2))
//!     .await?;
//!
//! let total = pool
//!     .pipe(&[1, 2, 3, 4, 5])
//!     .map("double")
//!     .filter("greater_than_four")
//!     .reduce("add", 0)
//!     .await?;
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - pool lifecycle, priority, backpressure, abort
//! - `tests/pipeline_test.rs` - pipeline laws and terminal identities

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: tasks, registry, control, events, scheduler.
pub mod core;
/// Configuration models for pools and runtimes.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Array operations driven through the scheduler.
pub mod ops;
/// Lazy pipelines over a scheduler.
pub mod pipeline;
/// Execution-context adapters and runtime selection.
pub mod runtime;
/// Shared utilities.
pub mod util;
