//! Builders to construct pools from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::config::{PoolConfig, SchedulerConfig};
use crate::core::{EventSink, FunctionRegistry, PoolError, Scheduler};
use crate::runtime::{select_adapter, ContextAdapter};

/// Composes configuration, registry, adapter, and event sink into a [`Scheduler`].
#[derive(Clone)]
pub struct PoolBuilder {
    config: PoolConfig,
    registry: FunctionRegistry,
    adapter: Option<Arc<dyn ContextAdapter>>,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for PoolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("custom_adapter", &self.adapter.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl PoolBuilder {
    /// Builder with default configuration over `registry`.
    #[must_use]
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            config: PoolConfig::default(),
            registry,
            adapter: None,
            events: None,
        }
    }

    /// Use this configuration.
    #[must_use]
    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this adapter instead of the one selected by `config.runtime`.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ContextAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Deliver lifecycle events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Validate, construct, and create `min_workers` contexts.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` for invalid configuration, an unsupported
    /// runtime, or a missing tokio runtime.
    pub async fn build(self) -> Result<Scheduler, PoolError> {
        self.config.validate().map_err(PoolError::InvalidConfig)?;
        let adapter = match self.adapter {
            Some(adapter) => adapter,
            None => select_adapter(&self.config, self.registry.clone())?,
        };
        let pool = Scheduler::with_adapter(self.config, self.registry, adapter, self.events)?;
        pool.warm_up().await;
        Ok(pool)
    }
}

/// Build every pool in `cfg`, resolving adapters from each pool's runtime.
///
/// # Errors
///
/// `PoolError::InvalidConfig` if the configuration is invalid or a pool
/// cannot be built.
pub async fn build_pools(
    cfg: &SchedulerConfig,
    registry: &FunctionRegistry,
) -> Result<PoolRegistry, PoolError> {
    build_pools_with(cfg, registry, |_, pool_cfg| {
        select_adapter(pool_cfg, registry.clone())
    })
    .await
}

/// Build every pool in `cfg` with adapters produced by `adapter_factory`.
///
/// # Errors
///
/// `PoolError::InvalidConfig` if the configuration is invalid, or the
/// factory's error.
pub async fn build_pools_with<FA>(
    cfg: &SchedulerConfig,
    registry: &FunctionRegistry,
    mut adapter_factory: FA,
) -> Result<PoolRegistry, PoolError>
where
    FA: FnMut(&str, &PoolConfig) -> Result<Arc<dyn ContextAdapter>, PoolError>,
{
    cfg.validate()
        .map_err(|e| PoolError::InvalidConfig(format!("config invalid: {e}")))?;

    let mut pools = PoolRegistry::new(registry.clone());
    for (name, pool_cfg) in &cfg.pools {
        let adapter = adapter_factory(name, pool_cfg)?;
        let pool = PoolBuilder::new(registry.clone())
            .with_config(*pool_cfg)
            .with_adapter(adapter)
            .build()
            .await?;
        info!(pool = %name, pool_id = %pool.id(), "pool built from configuration");
        pools.insert(name.clone(), pool);
    }
    Ok(pools)
}

/// Named pools plus a lazily created default pool.
///
/// Replaces a process-wide singleton: callers hold the registry and ask it
/// for pools explicitly.
#[derive(Debug)]
pub struct PoolRegistry {
    pools: HashMap<String, Scheduler>,
    registry: FunctionRegistry,
    default_config: PoolConfig,
    default: Mutex<Option<Scheduler>>,
}

impl PoolRegistry {
    /// Empty registry whose default pool resolves functions in `registry`.
    #[must_use]
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            pools: HashMap::new(),
            registry,
            default_config: PoolConfig::default(),
            default: Mutex::new(None),
        }
    }

    /// Configuration used when the default pool is first created.
    #[must_use]
    pub fn with_default_config(mut self, config: PoolConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Add or replace a named pool, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, pool: Scheduler) -> Option<Scheduler> {
        self.pools.insert(name.into(), pool)
    }

    /// Pool registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Scheduler> {
        self.pools.get(name)
    }

    /// Names of the configured pools, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Default pool, created on first use.
    ///
    /// # Errors
    ///
    /// Errors from [`PoolBuilder::build`].
    pub async fn default_pool(&self) -> Result<Scheduler, PoolError> {
        let mut slot = self.default.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }
        let pool = PoolBuilder::new(self.registry.clone())
            .with_config(self.default_config)
            .build()
            .await?;
        info!(pool_id = %pool.id(), "default pool created");
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Terminate and forget the default pool; the next
    /// [`PoolRegistry::default_pool`] call creates a fresh one.
    pub async fn reset_default(&self) {
        let previous = self.default.lock().await.take();
        if let Some(pool) = previous {
            pool.terminate().await;
        }
    }

    /// Terminate every named pool and the default pool.
    pub async fn terminate_all(&self) {
        for pool in self.pools.values() {
            pool.terminate().await;
        }
        self.reset_default().await;
    }
}
