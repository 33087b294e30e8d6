//! Named function registry shared by the scheduler and its execution contexts.
//!
//! Functions never cross an isolation boundary as code. A task names a
//! function registered here; every execution context resolves that name
//! against the same registry when the serialized task arrives.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context as _;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A registered task function: positional JSON arguments in, JSON result out.
pub type TaskFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Thread-safe registry of task functions, cheap to clone.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<RwLock<HashMap<String, TaskFn>>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw function over JSON arguments, replacing any previous entry.
    pub fn register<F>(&self, name: impl Into<String>, function: F) -> &Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(function = %name, "registering task function");
        self.functions.write().insert(name, Arc::new(function));
        self
    }

    /// Register a typed single-argument function.
    pub fn register_unary<A, R, F>(&self, name: impl Into<String>, function: F) -> &Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.register(name, move |args| {
            let a = arg::<A>(args, 0)?;
            Ok(serde_json::to_value(function(a))?)
        })
    }

    /// Register a typed single-argument function that can fail.
    pub fn register_fallible_unary<A, R, F>(&self, name: impl Into<String>, function: F) -> &Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.register(name, move |args| {
            let a = arg::<A>(args, 0)?;
            Ok(serde_json::to_value(function(a)?)?)
        })
    }

    /// Register a typed two-argument function (reducers take `(accumulator, item)`).
    pub fn register_binary<A, B, R, F>(&self, name: impl Into<String>, function: F) -> &Self
    where
        A: DeserializeOwned,
        B: DeserializeOwned,
        R: Serialize,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        self.register(name, move |args| {
            let a = arg::<A>(args, 0)?;
            let b = arg::<B>(args, 1)?;
            Ok(serde_json::to_value(function(a, b))?)
        })
    }

    /// Look up a function by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.functions.read().get(name).cloned()
    }

    /// Whether a function with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Decode positional argument `index`; a missing argument decodes from `null`.
///
/// # Errors
///
/// Fails when the argument does not match the requested type.
pub fn arg<A: DeserializeOwned>(args: &[Value], index: usize) -> anyhow::Result<A> {
    let value = args.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).with_context(|| format!("argument {index} has unexpected type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_registration() {
        let registry = FunctionRegistry::new();
        registry
            .register_unary("square", |x: i64| x * x)
            .register_binary("concat", |a: String, b: String| a + &b);

        let square = registry.get("square").unwrap();
        assert_eq!(square(&[json!(7)]).unwrap(), json!(49));

        let concat = registry.get("concat").unwrap();
        assert_eq!(concat(&[json!("a"), json!("b")]).unwrap(), json!("ab"));
        assert_eq!(registry.names(), vec!["concat".to_string(), "square".to_string()]);
    }

    #[test]
    fn test_argument_mismatch_is_an_error() {
        let registry = FunctionRegistry::new();
        registry.register_unary("square", |x: i64| x * x);
        let square = registry.get("square").unwrap();
        let err = square(&[json!("seven")]).unwrap_err();
        assert!(err.to_string().contains("argument 0"));
    }

    #[test]
    fn test_fallible_function() {
        let registry = FunctionRegistry::new();
        registry.register_fallible_unary("checked", |x: i64| {
            anyhow::ensure!(x >= 0, "negative input");
            Ok(x)
        });
        let checked = registry.get("checked").unwrap();
        assert_eq!(checked(&[json!(3)]).unwrap(), json!(3));
        assert!(checked(&[json!(-3)]).is_err());
    }

    #[test]
    fn test_clones_share_entries() {
        let registry = FunctionRegistry::new();
        let shared = registry.clone();
        registry.register("answer", |_| Ok(json!(42)));
        assert!(shared.contains("answer"));
        assert!(!shared.contains("question"));
    }
}
