//! Lazy pipelines over a scheduler.
//!
//! A [`Pipeline`] records operations and runs nothing until it is executed
//! or awaited. Per-element transforms (`map`, `filter`, `flat_map`) go
//! through the scheduler; every other operation runs in-process on the
//! materialized sequence. Terminal operations turn the builder into a
//! [`TerminalPipeline`], which can only be executed.

pub mod structural;
pub mod terminal;

use std::cmp::Ordering;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::{PoolError, Scheduler};
use crate::ops::{to_values, BatchOptions};
use crate::util::value::compare_values;

pub use terminal::{Terminal, TerminalPipeline};

/// Local per-element predicate.
pub type LocalPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
/// Local comparator.
pub type LocalComparator = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;
/// Local side-effect hook.
pub type LocalInspect = Arc<dyn Fn(&Value) + Send + Sync>;

/// One recorded intermediate operation.
#[derive(Clone)]
pub enum Operation {
    /// Apply a registered function to each element.
    Map(String),
    /// Keep elements whose registered predicate is truthy.
    Filter(String),
    /// Map to arrays and concatenate.
    FlatMap(String),
    /// Keep the first `n` elements.
    Take(usize),
    /// Drop the first `n` elements.
    Skip(usize),
    /// Group into arrays of `size`.
    Chunk(usize),
    /// Sliding windows.
    Window {
        /// Window length.
        size: usize,
        /// Distance between window starts.
        step: usize,
    },
    /// Stable sort, natural order when `None`.
    Sort(Option<LocalComparator>),
    /// Reverse order.
    Reverse,
    /// Drop repeated values.
    Unique,
    /// Pair with a companion sequence.
    Zip(Vec<Value>),
    /// Alternate with a companion sequence.
    Interleave(Vec<Value>),
    /// Rotate right (negative: left).
    Rotate(i64),
    /// Remove falsy values.
    Compact,
    /// Splice nested arrays up to a depth.
    Flatten(usize),
    /// Random order, optionally seeded.
    Shuffle(Option<u64>),
    /// Random subset, optionally seeded.
    Sample(usize, Option<u64>),
    /// Skip the leading matching run.
    DropWhile(LocalPredicate),
    /// Keep the leading matching run.
    TakeWhile(LocalPredicate),
    /// Observe each element without changing it.
    Tap(LocalInspect),
}

impl Operation {
    /// Operation kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Map(_) => "map",
            Self::Filter(_) => "filter",
            Self::FlatMap(_) => "flat_map",
            Self::Take(_) => "take",
            Self::Skip(_) => "skip",
            Self::Chunk(_) => "chunk",
            Self::Window { .. } => "window",
            Self::Sort(_) => "sort",
            Self::Reverse => "reverse",
            Self::Unique => "unique",
            Self::Zip(_) => "zip",
            Self::Interleave(_) => "interleave",
            Self::Rotate(_) => "rotate",
            Self::Compact => "compact",
            Self::Flatten(_) => "flatten",
            Self::Shuffle(_) => "shuffle",
            Self::Sample(..) => "sample",
            Self::DropWhile(_) => "drop_while",
            Self::TakeWhile(_) => "take_while",
            Self::Tap(_) => "tap",
        }
    }

    /// Whether the operation is dispatched through the scheduler.
    #[must_use]
    pub const fn is_distributed(&self) -> bool {
        matches!(self, Self::Map(_) | Self::Filter(_) | Self::FlatMap(_))
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(func) | Self::Filter(func) | Self::FlatMap(func) => {
                write!(f, "{}({func})", self.name())
            }
            Self::Take(n) | Self::Skip(n) | Self::Chunk(n) | Self::Flatten(n) => {
                write!(f, "{}({n})", self.name())
            }
            Self::Window { size, step } => write!(f, "window({size}, {step})"),
            Self::Rotate(n) => write!(f, "rotate({n})"),
            Self::Zip(other) | Self::Interleave(other) => {
                write!(f, "{}([{} items])", self.name(), other.len())
            }
            Self::Shuffle(seed) => write!(f, "shuffle({seed:?})"),
            Self::Sample(n, seed) => write!(f, "sample({n}, {seed:?})"),
            _ => f.write_str(self.name()),
        }
    }
}

/// Apply one in-process operation.
fn apply_local(operation: &Operation, items: Vec<Value>) -> Result<Vec<Value>, PoolError> {
    Ok(match operation {
        Operation::Take(n) => structural::take(items, *n),
        Operation::Skip(n) => structural::skip(items, *n),
        Operation::Chunk(size) => structural::chunk(&items, *size)?
            .into_iter()
            .map(Value::Array)
            .collect(),
        Operation::Window { size, step } => structural::window(&items, *size, *step)?
            .into_iter()
            .map(Value::Array)
            .collect(),
        Operation::Sort(None) => structural::sort_by(items, compare_values),
        Operation::Sort(Some(compare)) => structural::sort_by(items, |a, b| compare(a, b)),
        Operation::Reverse => structural::reverse(items),
        Operation::Unique => structural::unique(items),
        Operation::Zip(other) => structural::zip(items, other),
        Operation::Interleave(other) => structural::interleave(items, other),
        Operation::Rotate(n) => structural::rotate(items, *n),
        Operation::Compact => structural::compact(items),
        Operation::Flatten(depth) => structural::flatten(items, *depth),
        Operation::Shuffle(seed) => structural::shuffle(items, *seed),
        Operation::Sample(n, seed) => structural::sample(&items, *n, *seed),
        Operation::DropWhile(predicate) => structural::drop_while(items, |v| predicate(v)),
        Operation::TakeWhile(predicate) => structural::take_while(items, |v| predicate(v)),
        Operation::Tap(inspect) => {
            items.iter().for_each(|v| inspect(v));
            items
        }
        Operation::Map(_) | Operation::Filter(_) | Operation::FlatMap(_) => items,
    })
}

/// Recorded, not yet executed chain of sequence operations.
#[derive(Clone)]
pub struct Pipeline {
    pool: Scheduler,
    source: Vec<Value>,
    operations: Vec<Operation>,
    options: BatchOptions,
    /// Conversion failure surfaced at execution.
    pending_error: Option<PoolError>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source_len", &self.source.len())
            .field("operations", &self.operations)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Start a lazy pipeline over `items`.
    ///
    /// A conversion failure is reported when the pipeline executes.
    #[must_use]
    pub fn pipe<T: Serialize>(&self, items: &[T]) -> Pipeline {
        match to_values(items) {
            Ok(source) => self.pipe_values(source),
            Err(err) => {
                let mut pipeline = self.pipe_values(Vec::new());
                pipeline.pending_error = Some(err);
                pipeline
            }
        }
    }

    /// Start a lazy pipeline over already-converted values.
    #[must_use]
    pub fn pipe_values(&self, source: Vec<Value>) -> Pipeline {
        Pipeline {
            pool: self.clone(),
            source,
            operations: Vec::new(),
            options: BatchOptions::default(),
            pending_error: None,
        }
    }
}

impl Pipeline {
    fn push(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    fn companion<T: Serialize>(mut self, other: &[T], wrap: fn(Vec<Value>) -> Operation) -> Self {
        match to_values(other) {
            Ok(values) => self.push(wrap(values)),
            Err(err) => {
                self.pending_error.get_or_insert(err);
                self
            }
        }
    }

    /// Recorded operations, in order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Options used for distributed operations.
    #[must_use]
    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Apply a registered function to each element.
    #[must_use]
    pub fn map(self, function: impl Into<String>) -> Self {
        self.push(Operation::Map(function.into()))
    }

    /// Keep elements whose registered predicate returns a truthy value.
    #[must_use]
    pub fn filter(self, predicate: impl Into<String>) -> Self {
        self.push(Operation::Filter(predicate.into()))
    }

    /// Map each element to an array and concatenate.
    #[must_use]
    pub fn flat_map(self, function: impl Into<String>) -> Self {
        self.push(Operation::FlatMap(function.into()))
    }

    /// Keep the first `n` elements.
    #[must_use]
    pub fn take(self, n: usize) -> Self {
        self.push(Operation::Take(n))
    }

    /// Drop the first `n` elements.
    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        self.push(Operation::Skip(n))
    }

    /// Group into arrays of `size`; the last may be shorter.
    #[must_use]
    pub fn chunk(self, size: usize) -> Self {
        self.push(Operation::Chunk(size))
    }

    /// Overlapping windows of `size`, advancing by one.
    #[must_use]
    pub fn window(self, size: usize) -> Self {
        self.window_with_step(size, 1)
    }

    /// Windows of `size` advancing by `step`.
    #[must_use]
    pub fn window_with_step(self, size: usize, step: usize) -> Self {
        self.push(Operation::Window { size, step })
    }

    /// Stable sort in natural value order.
    #[must_use]
    pub fn sort(self) -> Self {
        self.push(Operation::Sort(None))
    }

    /// Stable sort with a local comparator.
    #[must_use]
    pub fn sort_by<F>(self, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        self.push(Operation::Sort(Some(Arc::new(compare))))
    }

    /// Reverse the sequence.
    #[must_use]
    pub fn reverse(self) -> Self {
        self.push(Operation::Reverse)
    }

    /// Drop repeated values, keeping first occurrences.
    #[must_use]
    pub fn unique(self) -> Self {
        self.push(Operation::Unique)
    }

    /// Pair each element with the element at the same position in `other`.
    #[must_use]
    pub fn zip<T: Serialize>(self, other: &[T]) -> Self {
        self.companion(other, Operation::Zip)
    }

    /// Alternate elements with `other`.
    #[must_use]
    pub fn interleave<T: Serialize>(self, other: &[T]) -> Self {
        self.companion(other, Operation::Interleave)
    }

    /// Rotate right by `n`, left when negative.
    #[must_use]
    pub fn rotate(self, n: i64) -> Self {
        self.push(Operation::Rotate(n))
    }

    /// Remove falsy values.
    #[must_use]
    pub fn compact(self) -> Self {
        self.push(Operation::Compact)
    }

    /// Splice nested arrays up to `depth` levels.
    #[must_use]
    pub fn flatten(self, depth: usize) -> Self {
        self.push(Operation::Flatten(depth))
    }

    /// Random order; pass a seed for a reproducible result.
    #[must_use]
    pub fn shuffle(self, seed: Option<u64>) -> Self {
        self.push(Operation::Shuffle(seed))
    }

    /// Up to `n` random elements.
    #[must_use]
    pub fn sample(self, n: usize, seed: Option<u64>) -> Self {
        self.push(Operation::Sample(n, seed))
    }

    /// Skip the leading run matching a local predicate.
    #[must_use]
    pub fn drop_while<F>(self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.push(Operation::DropWhile(Arc::new(predicate)))
    }

    /// Keep the leading run matching a local predicate.
    #[must_use]
    pub fn take_while<F>(self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.push(Operation::TakeWhile(Arc::new(predicate)))
    }

    /// Observe every element as it passes.
    #[must_use]
    pub fn tap<F>(self, inspect: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.push(Operation::Tap(Arc::new(inspect)))
    }

    /// Replay the chain left to right and return the resulting sequence.
    ///
    /// # Errors
    ///
    /// The first failing operation's error.
    pub async fn execute(self) -> Result<Vec<Value>, PoolError> {
        let (_, _, items) = self.materialize().await?;
        Ok(items)
    }

    /// Execute and deserialize every element.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::execute`], plus `Serialization`.
    pub async fn collect<U: DeserializeOwned>(self) -> Result<Vec<U>, PoolError> {
        self.execute()
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(PoolError::from))
            .collect()
    }

    /// Run the chain, handing back the pool and options for a terminal step.
    pub(crate) async fn materialize(
        self,
    ) -> Result<(Scheduler, BatchOptions, Vec<Value>), PoolError> {
        let Self {
            pool,
            source,
            operations,
            options,
            pending_error,
        } = self;
        if let Some(err) = pending_error {
            return Err(err);
        }
        options.validate()?;

        let mut items = source;
        for operation in &operations {
            let before = items.len();
            items = match operation {
                Operation::Map(function) => pool.map_values(&items, function, &options).await?,
                Operation::Filter(predicate) => {
                    let keep = pool.predicate_values(&items, predicate, &options).await?;
                    items
                        .into_iter()
                        .zip(keep)
                        .filter_map(|(item, keep)| keep.then_some(item))
                        .collect()
                }
                Operation::FlatMap(function) => {
                    pool.flat_map_values(&items, function, &options).await?
                }
                local => apply_local(local, items)?,
            };
            debug!(operation = ?operation, before, after = items.len(), "pipeline step");
        }
        Ok((pool, options, items))
    }
}

impl IntoFuture for Pipeline {
    type Output = Result<Vec<Value>, PoolError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, RuntimeConfig};
    use crate::core::FunctionRegistry;
    use serde_json::json;

    fn pool() -> Scheduler {
        let registry = FunctionRegistry::new();
        registry.register_unary("double", |x: i64| x * 2);
        registry.register_unary("gt4", |x: i64| x > 4);
        registry.register_unary("pair", |x: i64| vec![x, x]);
        let config = PoolConfig::new()
            .with_runtime(RuntimeConfig::Task)
            .with_max_workers(2);
        Scheduler::new(config, registry).unwrap()
    }

    #[tokio::test]
    async fn test_records_without_running() {
        let pool = pool();
        let pipeline = pool.pipe(&[1, 2, 3]).map("double").take(2).reverse();
        let names: Vec<&str> = pipeline.operations().iter().map(Operation::name).collect();
        assert_eq!(names, vec!["map", "take", "reverse"]);
        assert_eq!(pool.stats().completed_tasks, 0);
    }

    #[tokio::test]
    async fn test_map_filter_matches_local() {
        let pool = pool();
        let out: Vec<i64> = pool
            .pipe(&[1, 2, 3, 4, 5])
            .map("double")
            .filter("gt4")
            .collect()
            .await
            .unwrap();
        assert_eq!(out, vec![6, 8, 10]);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_structural_chain_and_await() {
        let pool = pool();
        let out = pool
            .pipe(&[3, 1, 2, 3, 5])
            .unique()
            .sort()
            .rotate(1)
            .chunk(2)
            .await
            .unwrap();
        assert_eq!(out, vec![json!([5, 1]), json!([2, 3])]);
    }

    #[tokio::test]
    async fn test_flat_map_and_flatten() {
        let pool = pool();
        let out = pool.pipe(&[1, 2]).flat_map("pair").execute().await.unwrap();
        assert_eq!(out, vec![json!(1), json!(1), json!(2), json!(2)]);
        let nested = pool.pipe(&[json!([1, [2]]), json!(3)]).flatten(1).execute().await.unwrap();
        assert_eq!(nested, vec![json!(1), json!([2]), json!(3)]);
        pool.terminate().await;
    }

    #[tokio::test]
    async fn test_zero_chunk_fails_at_execution() {
        let pool = pool();
        let err = pool.pipe(&[1, 2]).chunk(0).execute().await.unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)));
    }
}
