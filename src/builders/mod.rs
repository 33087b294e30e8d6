//! Builders to construct pools from configuration.

pub mod pool_builder;

pub use pool_builder::{build_pools, build_pools_with, PoolBuilder, PoolRegistry};
