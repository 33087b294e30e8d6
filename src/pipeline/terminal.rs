//! Terminal pipeline operations.
//!
//! `reduce`, `for_each`, `find`, `some`, `every`, `count_by`, `group_by`, and
//! `partition` call registered functions through the scheduler. The rest are
//! computed locally on the materialized sequence.

use std::cmp::Ordering;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::core::PoolError;
use crate::util::value::{compare_values, group_key};

use super::Pipeline;

/// Terminal operation record; always the last step of a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// Sequential left fold with a registered reducer.
    Reduce {
        /// Reducer called with `[acc, x]`.
        function: String,
        /// Initial accumulator.
        initial: Value,
    },
    /// Call a registered function for each element, discarding results.
    ForEach(String),
    /// First element whose predicate is truthy.
    Find(String),
    /// Whether any predicate is truthy.
    Some(String),
    /// Whether every predicate is truthy.
    Every(String),
    /// Number of elements.
    Count,
    /// Number of elements whose predicate is truthy.
    CountBy(String),
    /// Group by a registered key function.
    GroupBy(String),
    /// Split by a registered predicate.
    Partition(String),
    /// Numeric sum.
    Sum,
    /// Numeric mean.
    Average,
    /// Smallest element.
    Min,
    /// Largest element.
    Max,
    /// Join elements as text.
    Join(String),
    /// Whether a value is present.
    Includes(Value),
    /// First element.
    First,
    /// Last element.
    Last,
    /// Whether the sequence is empty.
    IsEmpty,
}

impl Terminal {
    /// Terminal kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reduce { .. } => "reduce",
            Self::ForEach(_) => "for_each",
            Self::Find(_) => "find",
            Self::Some(_) => "some",
            Self::Every(_) => "every",
            Self::Count => "count",
            Self::CountBy(_) => "count_by",
            Self::GroupBy(_) => "group_by",
            Self::Partition(_) => "partition",
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Min => "min",
            Self::Max => "max",
            Self::Join(_) => "join",
            Self::Includes(_) => "includes",
            Self::First => "first",
            Self::Last => "last",
            Self::IsEmpty => "is_empty",
        }
    }
}

/// Untyped terminal result before conversion to the caller's type.
#[derive(Debug)]
pub(crate) enum Output {
    Unit,
    Value(Value),
    Maybe(Option<Value>),
    Flag(bool),
    Count(usize),
    Number(f64),
    Text(String),
    Groups(IndexMap<String, Vec<Value>>),
    Split(Vec<Value>, Vec<Value>),
}

type Extract<T> = fn(Output) -> Result<T, PoolError>;

fn mismatch(terminal: &str) -> PoolError {
    PoolError::InvalidArgument(format!("terminal `{terminal}` produced an unexpected result"))
}

/// A pipeline ending in a terminal operation. Its only operation is execution.
pub struct TerminalPipeline<T> {
    pipeline: Pipeline,
    terminal: Terminal,
    extract: Extract<T>,
}

impl<T> fmt::Debug for TerminalPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalPipeline")
            .field("pipeline", &self.pipeline)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl<T> TerminalPipeline<T> {
    /// The terminal record.
    #[must_use]
    pub const fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Recorded intermediate operations.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Replay the chain, then evaluate the terminal.
    ///
    /// # Errors
    ///
    /// The first failing operation's error.
    pub async fn execute(self) -> Result<T, PoolError> {
        let Self {
            pipeline,
            terminal,
            extract,
        } = self;
        let (pool, options, items) = pipeline.materialize().await?;
        tracing::debug!(terminal = terminal.name(), len = items.len(), "evaluating terminal");

        let output = match terminal {
            Terminal::Reduce { function, initial } => {
                Output::Value(pool.fold_values(&items, &function, initial, &options.task).await?)
            }
            Terminal::ForEach(function) => {
                pool.map_values(&items, &function, &options).await?;
                Output::Unit
            }
            Terminal::Find(predicate) => {
                let index = pool.scan_values(&items, &predicate, true, &options).await?;
                Output::Maybe(index.and_then(|i| items.into_iter().nth(i)))
            }
            Terminal::Some(predicate) => {
                let index = pool.scan_values(&items, &predicate, true, &options).await?;
                Output::Flag(index.is_some())
            }
            Terminal::Every(predicate) => {
                let index = pool.scan_values(&items, &predicate, false, &options).await?;
                Output::Flag(index.is_none())
            }
            Terminal::CountBy(predicate) => {
                let keep = pool.predicate_values(&items, &predicate, &options).await?;
                Output::Count(keep.into_iter().filter(|k| *k).count())
            }
            Terminal::GroupBy(key_fn) => {
                Output::Groups(pool.group_values(&items, &key_fn, &options).await?)
            }
            Terminal::Partition(predicate) => {
                let keep = pool.predicate_values(&items, &predicate, &options).await?;
                let (hits, misses): (Vec<_>, Vec<_>) =
                    items.into_iter().zip(keep).partition(|(_, keep)| *keep);
                Output::Split(
                    hits.into_iter().map(|(v, _)| v).collect(),
                    misses.into_iter().map(|(v, _)| v).collect(),
                )
            }
            local => evaluate_local(&local, items)?,
        };
        extract(output)
    }
}

impl<T: Send + 'static> IntoFuture for TerminalPipeline<T> {
    type Output = Result<T, PoolError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

fn numbers(items: &[Value], terminal: &str) -> Result<Vec<f64>, PoolError> {
    items
        .iter()
        .map(|item| {
            item.as_f64().ok_or_else(|| {
                PoolError::InvalidArgument(format!("{terminal} requires numbers, got {item}"))
            })
        })
        .collect()
}

/// Sum of numeric elements; 0 for an empty sequence.
///
/// # Errors
///
/// `InvalidArgument` if an element is not a number.
pub fn sum(items: &[Value]) -> Result<f64, PoolError> {
    Ok(numbers(items, "sum")?.into_iter().sum())
}

/// Arithmetic mean; `NaN` for an empty sequence.
///
/// # Errors
///
/// `InvalidArgument` if an element is not a number.
pub fn average(items: &[Value]) -> Result<f64, PoolError> {
    let values = numbers(items, "average")?;
    if values.is_empty() {
        return Ok(f64::NAN);
    }
    #[allow(clippy::cast_precision_loss)]
    let len = values.len() as f64;
    Ok(values.into_iter().sum::<f64>() / len)
}

/// Extreme element by `wanted` ordering; ties keep the first encountered.
fn extreme(items: Vec<Value>, wanted: Ordering) -> Option<Value> {
    let mut best: Option<Value> = None;
    for item in items {
        let replace = best
            .as_ref()
            .is_none_or(|current| compare_values(&item, current) == wanted);
        if replace {
            best = Some(item);
        }
    }
    best
}

/// Smallest element; `None` for an empty sequence.
#[must_use]
pub fn min(items: Vec<Value>) -> Option<Value> {
    extreme(items, Ordering::Less)
}

/// Largest element; `None` for an empty sequence.
#[must_use]
pub fn max(items: Vec<Value>) -> Option<Value> {
    extreme(items, Ordering::Greater)
}

/// Join elements with `separator`; `null` becomes an empty string.
#[must_use]
pub fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Null => String::new(),
            other => group_key(other),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Whether `target` is present. Numbers compare by value, so `1` matches `1.0`.
#[must_use]
pub fn includes(items: &[Value], target: &Value) -> bool {
    items.iter().any(|item| match (item, target) {
        (Value::Number(_), Value::Number(_)) => compare_values(item, target) == Ordering::Equal,
        _ => item == target,
    })
}

fn evaluate_local(terminal: &Terminal, items: Vec<Value>) -> Result<Output, PoolError> {
    Ok(match terminal {
        Terminal::Count => Output::Count(items.len()),
        Terminal::Sum => Output::Number(sum(&items)?),
        Terminal::Average => Output::Number(average(&items)?),
        Terminal::Min => Output::Maybe(min(items)),
        Terminal::Max => Output::Maybe(max(items)),
        Terminal::Join(separator) => Output::Text(join(&items, separator)),
        Terminal::Includes(target) => Output::Flag(includes(&items, target)),
        Terminal::First => Output::Maybe(items.into_iter().next()),
        Terminal::Last => Output::Maybe(items.into_iter().last()),
        Terminal::IsEmpty => Output::Flag(items.is_empty()),
        other => return Err(mismatch(other.name())),
    })
}

impl Pipeline {
    fn finish<T>(self, terminal: Terminal, extract: Extract<T>) -> TerminalPipeline<T> {
        TerminalPipeline {
            pipeline: self,
            terminal,
            extract,
        }
    }

    /// Fold left with a registered reducer called as `reducer(acc, x)`.
    ///
    /// An initial value that fails to convert is reported at execution.
    #[must_use]
    pub fn reduce<A: Serialize>(mut self, reducer: impl Into<String>, initial: A) -> TerminalPipeline<Value> {
        let initial = match serde_json::to_value(initial) {
            Ok(value) => value,
            Err(err) => {
                self.pending_error.get_or_insert(err.into());
                Value::Null
            }
        };
        self.finish(
            Terminal::Reduce {
                function: reducer.into(),
                initial,
            },
            |out| match out {
                Output::Value(v) => Ok(v),
                _ => Err(mismatch("reduce")),
            },
        )
    }

    /// Call a registered function for every element.
    #[must_use]
    pub fn for_each(self, function: impl Into<String>) -> TerminalPipeline<()> {
        self.finish(Terminal::ForEach(function.into()), |out| match out {
            Output::Unit => Ok(()),
            _ => Err(mismatch("for_each")),
        })
    }

    /// First element whose registered predicate is truthy.
    #[must_use]
    pub fn find(self, predicate: impl Into<String>) -> TerminalPipeline<Option<Value>> {
        self.finish(Terminal::Find(predicate.into()), extract_maybe)
    }

    /// Whether any element satisfies the registered predicate.
    #[must_use]
    pub fn some(self, predicate: impl Into<String>) -> TerminalPipeline<bool> {
        self.finish(Terminal::Some(predicate.into()), extract_flag)
    }

    /// Whether every element satisfies the registered predicate.
    #[must_use]
    pub fn every(self, predicate: impl Into<String>) -> TerminalPipeline<bool> {
        self.finish(Terminal::Every(predicate.into()), extract_flag)
    }

    /// Number of elements.
    #[must_use]
    pub fn count(self) -> TerminalPipeline<usize> {
        self.finish(Terminal::Count, extract_count)
    }

    /// Number of elements satisfying the registered predicate.
    #[must_use]
    pub fn count_by(self, predicate: impl Into<String>) -> TerminalPipeline<usize> {
        self.finish(Terminal::CountBy(predicate.into()), extract_count)
    }

    /// Group elements by a registered key function.
    #[must_use]
    pub fn group_by(
        self,
        key_fn: impl Into<String>,
    ) -> TerminalPipeline<IndexMap<String, Vec<Value>>> {
        self.finish(Terminal::GroupBy(key_fn.into()), |out| match out {
            Output::Groups(groups) => Ok(groups),
            _ => Err(mismatch("group_by")),
        })
    }

    /// Split into (matching, non-matching).
    #[must_use]
    pub fn partition(
        self,
        predicate: impl Into<String>,
    ) -> TerminalPipeline<(Vec<Value>, Vec<Value>)> {
        self.finish(Terminal::Partition(predicate.into()), |out| match out {
            Output::Split(hits, misses) => Ok((hits, misses)),
            _ => Err(mismatch("partition")),
        })
    }

    /// Sum of numeric elements.
    #[must_use]
    pub fn sum(self) -> TerminalPipeline<f64> {
        self.finish(Terminal::Sum, extract_number)
    }

    /// Mean of numeric elements; `NaN` when empty.
    #[must_use]
    pub fn average(self) -> TerminalPipeline<f64> {
        self.finish(Terminal::Average, extract_number)
    }

    /// Smallest element.
    #[must_use]
    pub fn min(self) -> TerminalPipeline<Option<Value>> {
        self.finish(Terminal::Min, extract_maybe)
    }

    /// Largest element.
    #[must_use]
    pub fn max(self) -> TerminalPipeline<Option<Value>> {
        self.finish(Terminal::Max, extract_maybe)
    }

    /// Join elements as text.
    #[must_use]
    pub fn join(self, separator: impl Into<String>) -> TerminalPipeline<String> {
        self.finish(Terminal::Join(separator.into()), |out| match out {
            Output::Text(text) => Ok(text),
            _ => Err(mismatch("join")),
        })
    }

    /// Whether `value` appears in the sequence.
    #[must_use]
    pub fn includes<V: Serialize>(mut self, value: &V) -> TerminalPipeline<bool> {
        let target = match serde_json::to_value(value) {
            Ok(target) => target,
            Err(err) => {
                self.pending_error.get_or_insert(err.into());
                Value::Null
            }
        };
        self.finish(Terminal::Includes(target), extract_flag)
    }

    /// First element.
    #[must_use]
    pub fn first(self) -> TerminalPipeline<Option<Value>> {
        self.finish(Terminal::First, extract_maybe)
    }

    /// Last element.
    #[must_use]
    pub fn last(self) -> TerminalPipeline<Option<Value>> {
        self.finish(Terminal::Last, extract_maybe)
    }

    /// Whether the sequence is empty.
    #[must_use]
    pub fn is_empty(self) -> TerminalPipeline<bool> {
        self.finish(Terminal::IsEmpty, extract_flag)
    }
}

fn extract_maybe(out: Output) -> Result<Option<Value>, PoolError> {
    match out {
        Output::Maybe(v) => Ok(v),
        _ => Err(mismatch("optional")),
    }
}

fn extract_flag(out: Output) -> Result<bool, PoolError> {
    match out {
        Output::Flag(b) => Ok(b),
        _ => Err(mismatch("boolean")),
    }
}

fn extract_count(out: Output) -> Result<usize, PoolError> {
    match out {
        Output::Count(n) => Ok(n),
        _ => Err(mismatch("count")),
    }
}

fn extract_number(out: Output) -> Result<f64, PoolError> {
    match out {
        Output::Number(n) => Ok(n),
        _ => Err(mismatch("numeric")),
    }
}
