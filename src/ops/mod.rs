//! Array operations driven through the scheduler.
//!
//! Elements are submitted in consecutive chunks: everything inside a chunk
//! runs concurrently, chunks run one after another, and results are placed
//! by index. Any element failure fails the whole call, except in
//! [`Scheduler::batch`], which reports per-task outcomes.

use futures::future::{join_all, try_join_all};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::{PoolError, Scheduler, TaskOptions, TaskRequest, TaskState};
use crate::util::value::{group_key, is_truthy};

/// Default chunk size for short-circuiting operations.
pub const SHORT_CIRCUIT_BATCH_SIZE: usize = 10;

/// Options shared by every element of an array operation.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Elements per concurrent chunk. `None` uses the operation's default.
    pub batch_size: Option<usize>,
    /// Options applied to each element's task.
    pub task: TaskOptions,
}

impl BatchOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the per-task options.
    #[must_use]
    pub fn with_task_options(mut self, task: TaskOptions) -> Self {
        self.task = task;
        self
    }

    /// Reject a zero chunk size and invalid task options.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidArgument`.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.batch_size == Some(0) {
            return Err(PoolError::InvalidArgument(
                "batch_size must be greater than 0".into(),
            ));
        }
        self.task.validate()
    }

    fn chunk_size(&self, default: usize) -> usize {
        self.batch_size.unwrap_or(default).max(1)
    }
}

/// Result of one task inside [`Scheduler::batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Whether the task succeeded.
    pub success: bool,
    /// Task result on success.
    pub result: Option<Value>,
    /// Task error on failure.
    pub error: Option<PoolError>,
    /// Terminal state of the task.
    pub state: TaskState,
}

impl From<Result<Value, PoolError>> for BatchOutcome {
    fn from(outcome: Result<Value, PoolError>) -> Self {
        let state = TaskState::from_result(&outcome);
        match outcome {
            Ok(value) => Self {
                success: true,
                result: Some(value),
                error: None,
                state,
            },
            Err(err) => Self {
                success: false,
                result: None,
                error: Some(err),
                state,
            },
        }
    }
}

pub(crate) fn to_values<T: Serialize>(items: &[T]) -> Result<Vec<Value>, PoolError> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(PoolError::from))
        .collect()
}

fn from_values<R: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<R>, PoolError> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(PoolError::from))
        .collect()
}

fn pick<T: Clone>(items: &[T], keep: &[bool], wanted: bool) -> Vec<T> {
    items
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep == wanted)
        .map(|(item, _)| item.clone())
        .collect()
}

/// Bucket `items` under the group key of their matching entry in `keys`.
fn bucket<T: Clone>(items: &[T], keys: &[Value]) -> IndexMap<String, Vec<T>> {
    let mut groups: IndexMap<String, Vec<T>> = IndexMap::new();
    for (item, key) in items.iter().zip(keys) {
        groups.entry(group_key(key)).or_default().push(item.clone());
    }
    groups
}

impl Scheduler {
    fn element_request(function: &str, args: Vec<Value>, options: &TaskOptions) -> TaskRequest {
        TaskRequest::with_values(function, args).options(options.clone())
    }

    /// Apply `function` to every element, chunk by chunk. Order is preserved.
    pub(crate) async fn map_values(
        &self,
        items: &[Value],
        function: &str,
        options: &BatchOptions,
    ) -> Result<Vec<Value>, PoolError> {
        options.validate()?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let size = options.chunk_size(items.len());
        let mut results = Vec::with_capacity(items.len());
        for (index, chunk) in items.chunks(size).enumerate() {
            debug!(function, chunk = index, len = chunk.len(), "submitting chunk");
            let calls = chunk.iter().map(|item| {
                self.submit(Self::element_request(function, vec![item.clone()], &options.task))
            });
            results.extend(try_join_all(calls).await?);
        }
        Ok(results)
    }

    /// Truthiness of `function(x)` for every element.
    pub(crate) async fn predicate_values(
        &self,
        items: &[Value],
        function: &str,
        options: &BatchOptions,
    ) -> Result<Vec<bool>, PoolError> {
        let results = self.map_values(items, function, options).await?;
        Ok(results.iter().map(is_truthy).collect())
    }

    /// Index of the first element whose predicate truthiness equals `wanted`.
    ///
    /// Chunks default to `min(len, 10)`; no further chunk is submitted once a
    /// completed chunk contains a match.
    pub(crate) async fn scan_values(
        &self,
        items: &[Value],
        function: &str,
        wanted: bool,
        options: &BatchOptions,
    ) -> Result<Option<usize>, PoolError> {
        options.validate()?;
        if items.is_empty() {
            return Ok(None);
        }
        let size = options.chunk_size(SHORT_CIRCUIT_BATCH_SIZE.min(items.len()));
        for (chunk_index, chunk) in items.chunks(size).enumerate() {
            let calls = chunk.iter().map(|item| {
                self.submit(Self::element_request(function, vec![item.clone()], &options.task))
            });
            let results = try_join_all(calls).await?;
            if let Some(offset) = results.iter().position(|r| is_truthy(r) == wanted) {
                debug!(function, chunk = chunk_index, "short-circuited");
                return Ok(Some(chunk_index * size + offset));
            }
        }
        Ok(None)
    }

    /// Fold sequentially, one scheduler round-trip per element with `[acc, x]`.
    pub(crate) async fn fold_values<'a, I>(
        &self,
        items: I,
        function: &str,
        initial: Value,
        options: &TaskOptions,
    ) -> Result<Value, PoolError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut acc = initial;
        for item in items {
            acc = self
                .submit(Self::element_request(function, vec![acc, item.clone()], options))
                .await?;
        }
        Ok(acc)
    }

    /// Group elements by `function(x)`, keeping first-seen key order.
    pub(crate) async fn group_values(
        &self,
        items: &[Value],
        function: &str,
        options: &BatchOptions,
    ) -> Result<IndexMap<String, Vec<Value>>, PoolError> {
        let keys = self.map_values(items, function, options).await?;
        Ok(bucket(items, &keys))
    }

    /// Map then flatten one level; non-array results are kept as single elements.
    pub(crate) async fn flat_map_values(
        &self,
        items: &[Value],
        function: &str,
        options: &BatchOptions,
    ) -> Result<Vec<Value>, PoolError> {
        let mapped = self.map_values(items, function, options).await?;
        let mut flat = Vec::with_capacity(mapped.len());
        for value in mapped {
            match value {
                Value::Array(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Ok(flat)
    }

    /// Apply `function` to every element and return the results in input order.
    ///
    /// All elements of a chunk run concurrently; chunks run sequentially.
    /// `batch_size` defaults to the whole input.
    ///
    /// # Errors
    ///
    /// The first element failure, `Serialization` if an element or result
    /// does not convert, or `InvalidArgument` for a zero batch size.
    pub async fn map<T, R>(
        &self,
        items: &[T],
        function: &str,
        options: &BatchOptions,
    ) -> Result<Vec<R>, PoolError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let values = to_values(items)?;
        from_values(self.map_values(&values, function, options).await?)
    }

    /// Keep the elements for which `predicate` returns a truthy value.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn filter<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<Vec<T>, PoolError>
    where
        T: Serialize + Clone,
    {
        let values = to_values(items)?;
        let keep = self.predicate_values(&values, predicate, options).await?;
        Ok(pick(items, &keep, true))
    }

    /// Map each element to an array and concatenate the arrays.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn flat_map<T, R>(
        &self,
        items: &[T],
        function: &str,
        options: &BatchOptions,
    ) -> Result<Vec<R>, PoolError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let values = to_values(items)?;
        from_values(self.flat_map_values(&values, function, options).await?)
    }

    /// First element satisfying `predicate`, or `None`.
    ///
    /// Evaluates in chunks of `min(len, 10)` by default and stops after the
    /// first chunk containing a match; later elements in that chunk may
    /// still have run.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn find<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<Option<T>, PoolError>
    where
        T: Serialize + Clone,
    {
        let index = self.find_index(items, predicate, options).await?;
        Ok(index.and_then(|i| items.get(i).cloned()))
    }

    /// Index of the first element satisfying `predicate`, or `None`.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn find_index<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<Option<usize>, PoolError>
    where
        T: Serialize,
    {
        let values = to_values(items)?;
        self.scan_values(&values, predicate, true, options).await
    }

    /// Whether any element satisfies `predicate`. `false` for empty input.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn some<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<bool, PoolError>
    where
        T: Serialize,
    {
        Ok(self.find_index(items, predicate, options).await?.is_some())
    }

    /// Whether every element satisfies `predicate`. `true` for empty input.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn every<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<bool, PoolError>
    where
        T: Serialize,
    {
        let values = to_values(items)?;
        let failing = self.scan_values(&values, predicate, false, options).await?;
        Ok(failing.is_none())
    }

    /// Number of elements satisfying `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn count<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<usize, PoolError>
    where
        T: Serialize,
    {
        let values = to_values(items)?;
        let keep = self.predicate_values(&values, predicate, options).await?;
        Ok(keep.into_iter().filter(|k| *k).count())
    }

    /// Left fold: `reducer(acc, x)` for each element in order, strictly sequential.
    ///
    /// Returns `initial` unchanged for empty input.
    ///
    /// # Errors
    ///
    /// The first reducer failure, or `Serialization`.
    pub async fn reduce<T, A>(
        &self,
        items: &[T],
        reducer: &str,
        initial: A,
        options: &TaskOptions,
    ) -> Result<A, PoolError>
    where
        T: Serialize,
        A: Serialize + DeserializeOwned,
    {
        let values = to_values(items)?;
        let initial = serde_json::to_value(initial)?;
        let acc = self.fold_values(&values, reducer, initial, options).await?;
        Ok(serde_json::from_value(acc)?)
    }

    /// Right fold: like [`Scheduler::reduce`] but starting from the last element.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::reduce`].
    pub async fn reduce_right<T, A>(
        &self,
        items: &[T],
        reducer: &str,
        initial: A,
        options: &TaskOptions,
    ) -> Result<A, PoolError>
    where
        T: Serialize,
        A: Serialize + DeserializeOwned,
    {
        let values = to_values(items)?;
        let initial = serde_json::to_value(initial)?;
        let acc = self
            .fold_values(values.iter().rev(), reducer, initial, options)
            .await?;
        Ok(serde_json::from_value(acc)?)
    }

    /// Group elements by the key `key_fn` returns.
    ///
    /// Keys keep first-seen order, members keep input order. String keys are
    /// used as-is; other keys use their JSON text.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn group_by<T>(
        &self,
        items: &[T],
        key_fn: &str,
        options: &BatchOptions,
    ) -> Result<IndexMap<String, Vec<T>>, PoolError>
    where
        T: Serialize + Clone,
    {
        let values = to_values(items)?;
        let keys = self.map_values(&values, key_fn, options).await?;
        Ok(bucket(items, &keys))
    }

    /// Split into (matching, non-matching), both in input order.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::map`].
    pub async fn partition<T>(
        &self,
        items: &[T],
        predicate: &str,
        options: &BatchOptions,
    ) -> Result<(Vec<T>, Vec<T>), PoolError>
    where
        T: Serialize + Clone,
    {
        let values = to_values(items)?;
        let keep = self.predicate_values(&values, predicate, options).await?;
        Ok((pick(items, &keep, true), pick(items, &keep, false)))
    }

    /// Run heterogeneous tasks in chunks and report each one's outcome.
    ///
    /// A failing task never affects its siblings. `batch_size` defaults to
    /// all tasks at once.
    ///
    /// # Errors
    ///
    /// Only `InvalidArgument` for a zero batch size.
    pub async fn batch(
        &self,
        requests: Vec<TaskRequest>,
        batch_size: Option<usize>,
    ) -> Result<Vec<BatchOutcome>, PoolError> {
        if batch_size == Some(0) {
            return Err(PoolError::InvalidArgument(
                "batch_size must be greater than 0".into(),
            ));
        }
        let total = requests.len();
        let size = batch_size.unwrap_or(total).max(1);
        let mut outcomes = Vec::with_capacity(total);
        let mut pending = requests.into_iter().peekable();
        while pending.peek().is_some() {
            let chunk: Vec<TaskRequest> = pending.by_ref().take(size).collect();
            let results = join_all(chunk.into_iter().map(|request| self.submit(request))).await;
            outcomes.extend(results.into_iter().map(BatchOutcome::from));
        }
        let failed = outcomes.iter().filter(|o| !o.success).count();
        debug!(total, failed, "batch finished");
        Ok(outcomes)
    }

    /// Run all tasks concurrently and return their results in order.
    ///
    /// # Errors
    ///
    /// `PoolError::Aggregate` listing every failure if any task failed.
    pub async fn parallel(&self, requests: Vec<TaskRequest>) -> Result<Vec<Value>, PoolError> {
        let outcomes = self.batch(requests, None).await?;
        let total = outcomes.len();
        let failures: Vec<String> = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(ToString::to_string))
            .collect();
        if !failures.is_empty() {
            return Err(PoolError::Aggregate { total, failures });
        }
        Ok(outcomes.into_iter().filter_map(|o| o.result).collect())
    }
}
