//! Utility helpers: telemetry setup and JSON value semantics.

pub mod telemetry;
pub mod value;

pub use telemetry::{init_tracing, init_tracing_with};
pub use value::{compare_values, group_key, is_truthy};
