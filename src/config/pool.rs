//! Pool and scheduler configuration structures.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, PoolError};

/// Prefix of environment variables read by [`PoolConfig::from_env`].
pub const ENV_PREFIX: &str = "PROMETHEUS_PARALLEL_";

/// Smallest accepted worker-thread stack.
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Execution-context runtime selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeConfig {
    /// One dedicated OS thread per context.
    Thread,
    /// Contexts run on the async runtime's blocking pool.
    Task,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Task
        } else {
            Self::Thread
        }
    }
}

impl FromStr for RuntimeConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread" => Ok(Self::Thread),
            "task" => Ok(Self::Task),
            other => Err(format!("unknown runtime `{other}`")),
        }
    }
}

/// Pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Contexts kept alive even when idle.
    pub min_workers: usize,
    /// Hard ceiling on execution contexts.
    pub max_workers: usize,
    /// Maximum queued (not yet dispatched) tasks before rejection.
    pub queue_size_limit: usize,
    /// Idle time after which a context above `min_workers` is destroyed.
    pub idle_timeout_ms: u64,
    /// How long `terminate` waits for in-flight tasks.
    pub terminate_grace_ms: u64,
    /// Delay before retrying dispatch after a context creation failure.
    pub creation_backoff_ms: u64,
    /// Per-attempt timeout applied when a task sets none.
    pub default_timeout_ms: Option<u64>,
    /// Retry budget applied when a task sets none.
    pub default_max_retries: u32,
    /// Stack size of worker threads.
    pub thread_stack_size: usize,
    /// Execution-context runtime.
    pub runtime: RuntimeConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 0,
            max_workers: num_cpus::get().max(1),
            queue_size_limit: 10_000,
            idle_timeout_ms: 30_000,
            terminate_grace_ms: 5_000,
            creation_backoff_ms: 100,
            default_timeout_ms: None,
            default_max_retries: 0,
            thread_stack_size: 2 * 1024 * 1024,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of contexts.
    #[must_use]
    pub const fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    /// Set the maximum number of contexts.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the queue size limit.
    #[must_use]
    pub const fn with_queue_size_limit(mut self, limit: usize) -> Self {
        self.queue_size_limit = limit;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = ms;
        self
    }

    /// Set the terminate grace period.
    #[must_use]
    pub const fn with_terminate_grace_ms(mut self, ms: u64) -> Self {
        self.terminate_grace_ms = ms;
        self
    }

    /// Set the creation backoff.
    #[must_use]
    pub const fn with_creation_backoff_ms(mut self, ms: u64) -> Self {
        self.creation_backoff_ms = ms;
        self
    }

    /// Set the default per-attempt timeout.
    #[must_use]
    pub const fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.default_timeout_ms = Some(ms);
        self
    }

    /// Set the default retry budget.
    #[must_use]
    pub const fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the runtime.
    #[must_use]
    pub const fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Terminate grace period as a `Duration`.
    #[must_use]
    pub const fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    /// Creation backoff as a `Duration`.
    #[must_use]
    pub const fn creation_backoff(&self) -> Duration {
        Duration::from_millis(self.creation_backoff_ms)
    }

    /// Default timeout as a `Duration`.
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.min_workers > self.max_workers {
            return Err(format!(
                "min_workers ({}) must not exceed max_workers ({})",
                self.min_workers, self.max_workers
            ));
        }
        if self.queue_size_limit == 0 {
            return Err("queue_size_limit must be greater than 0".into());
        }
        if self.idle_timeout_ms == 0 {
            return Err("idle_timeout_ms must be greater than 0".into());
        }
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be greater than 0".into());
        }
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
        }
        Ok(())
    }

    /// Build from `PROMETHEUS_PARALLEL_*` environment variables, loading `.env` first.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if a variable cannot be parsed or the
    /// result fails validation.
    pub fn from_env() -> Result<Self, PoolError> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(v) = env_var("MIN_WORKERS")? {
            cfg.min_workers = v;
        }
        if let Some(v) = env_var("MAX_WORKERS")? {
            cfg.max_workers = v;
        }
        if let Some(v) = env_var("QUEUE_SIZE_LIMIT")? {
            cfg.queue_size_limit = v;
        }
        if let Some(v) = env_var("IDLE_TIMEOUT_MS")? {
            cfg.idle_timeout_ms = v;
        }
        if let Some(v) = env_var("TERMINATE_GRACE_MS")? {
            cfg.terminate_grace_ms = v;
        }
        if let Some(v) = env_var("CREATION_BACKOFF_MS")? {
            cfg.creation_backoff_ms = v;
        }
        if let Some(v) = env_var("DEFAULT_TIMEOUT_MS")? {
            cfg.default_timeout_ms = Some(v);
        }
        if let Some(v) = env_var("DEFAULT_MAX_RETRIES")? {
            cfg.default_max_retries = v;
        }
        if let Some(v) = env_var("THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }
        if let Some(v) = env_var("RUNTIME")? {
            cfg.runtime = v;
        }

        cfg.validate().map_err(PoolError::InvalidConfig)?;
        Ok(cfg)
    }
}

fn env_var<T>(name: &str) -> Result<Option<T>, PoolError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{ENV_PREFIX}{name}");
    match std::env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| PoolError::InvalidConfig(format!("{key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Root configuration for a set of named pools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, PoolConfig>,
}

impl SchedulerConfig {
    /// Validate all pools and ensure at least one pool exists.
    ///
    /// # Errors
    ///
    /// Returns a description naming the invalid pool.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed, or validated.
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading scheduler config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = PoolConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.max_workers >= 1);
        assert_eq!(cfg.min_workers, 0);
    }

    #[test]
    fn test_runtime_parse() {
        assert_eq!("thread".parse::<RuntimeConfig>().unwrap(), RuntimeConfig::Thread);
        assert_eq!(" Task ".parse::<RuntimeConfig>().unwrap(), RuntimeConfig::Task);
        assert!("gpu".parse::<RuntimeConfig>().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: PoolConfig = serde_json::from_str(r#"{"max_workers": 3, "runtime": "task"}"#).unwrap();
        assert_eq!(cfg.max_workers, 3);
        assert_eq!(cfg.runtime, RuntimeConfig::Task);
        assert_eq!(cfg.queue_size_limit, 10_000);
    }
}
