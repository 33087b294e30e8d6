//! Configuration models for pools and runtimes.

pub mod pool;

pub use pool::{PoolConfig, RuntimeConfig, SchedulerConfig, ENV_PREFIX};
