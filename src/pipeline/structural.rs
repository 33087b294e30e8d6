//! In-process sequence transforms.
//!
//! These never touch the scheduler: they reorder, slice, or reshape an
//! already materialized sequence.

use std::cmp::Ordering;
use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use serde_json::Value;

use crate::core::PoolError;
use crate::util::value::is_truthy;

fn positive(name: &str, value: usize) -> Result<usize, PoolError> {
    if value == 0 {
        return Err(PoolError::InvalidArgument(format!(
            "{name} must be greater than 0"
        )));
    }
    Ok(value)
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// First `n` elements.
#[must_use]
pub fn take<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    items.truncate(n);
    items
}

/// Everything after the first `n` elements.
#[must_use]
pub fn skip<T>(items: Vec<T>, n: usize) -> Vec<T> {
    items.into_iter().skip(n).collect()
}

/// Consecutive groups of `size`; the last group may be shorter.
///
/// # Errors
///
/// `InvalidArgument` if `size` is 0.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Result<Vec<Vec<T>>, PoolError> {
    let size = positive("chunk size", size)?;
    Ok(items.chunks(size).map(<[T]>::to_vec).collect())
}

/// Windows of `size` starting every `step` elements, emitted while
/// `start + size <= len`.
///
/// # Errors
///
/// `InvalidArgument` if `size` or `step` is 0.
pub fn window<T: Clone>(items: &[T], size: usize, step: usize) -> Result<Vec<Vec<T>>, PoolError> {
    let size = positive("window size", size)?;
    let step = positive("window step", step)?;
    let mut windows = Vec::new();
    let mut start = 0usize;
    while let Some(end) = start.checked_add(size) {
        if end > items.len() {
            break;
        }
        windows.push(items[start..end].to_vec());
        match start.checked_add(step) {
            Some(next) => start = next,
            None => break,
        }
    }
    Ok(windows)
}

/// Rotate right by `n` (left when negative), modulo the length.
#[must_use]
pub fn rotate<T>(mut items: Vec<T>, n: i64) -> Vec<T> {
    let len = items.len();
    if len == 0 || n == 0 {
        return items;
    }
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    // rem_euclid maps negative shifts to the equivalent right rotation.
    let shift = usize::try_from(n.rem_euclid(len_i)).unwrap_or(0);
    items.rotate_right(shift);
    items
}

/// Reverse the sequence.
#[must_use]
pub fn reverse<T>(mut items: Vec<T>) -> Vec<T> {
    items.reverse();
    items
}

/// Stable sort with a comparator.
#[must_use]
pub fn sort_by<T>(mut items: Vec<T>, compare: impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    items.sort_by(|a, b| compare(a, b));
    items
}

/// Drop repeated values, keeping the first occurrence. Values are equal when
/// their JSON text is equal.
#[must_use]
pub fn unique(items: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_string()))
        .collect()
}

/// Pair elements position by position, stopping at the shorter input.
#[must_use]
pub fn zip(items: Vec<Value>, other: &[Value]) -> Vec<Value> {
    items
        .into_iter()
        .zip(other.iter().cloned())
        .map(|(a, b)| Value::Array(vec![a, b]))
        .collect()
}

/// Alternate elements from both inputs, then append the longer one's tail.
#[must_use]
pub fn interleave<T: Clone>(items: Vec<T>, other: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len() + other.len());
    let mut left = items.into_iter();
    let mut right = other.iter().cloned();
    loop {
        match (left.next(), right.next()) {
            (None, None) => break,
            (a, b) => {
                out.extend(a);
                out.extend(b);
            }
        }
    }
    out
}

/// Remove falsy values.
#[must_use]
pub fn compact(items: Vec<Value>) -> Vec<Value> {
    items.into_iter().filter(is_truthy).collect()
}

/// Splice nested arrays into the sequence, up to `depth` levels.
#[must_use]
pub fn flatten(items: Vec<Value>, depth: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => out.extend(flatten(inner, depth - 1)),
            other => out.push(other),
        }
    }
    out
}

/// Shuffle; a seed makes the order reproducible.
#[must_use]
pub fn shuffle<T>(mut items: Vec<T>, seed: Option<u64>) -> Vec<T> {
    items.shuffle(&mut rng(seed));
    items
}

/// Up to `n` distinct positions chosen at random.
#[must_use]
pub fn sample<T: Clone>(items: &[T], n: usize, seed: Option<u64>) -> Vec<T> {
    let mut rng = rng(seed);
    let mut picked: Vec<T> = items.choose_multiple(&mut rng, n).cloned().collect();
    picked.shuffle(&mut rng);
    picked
}

/// Skip the leading run of elements matching `predicate`.
#[must_use]
pub fn drop_while<T>(items: Vec<T>, predicate: impl Fn(&T) -> bool) -> Vec<T> {
    items.into_iter().skip_while(|item| predicate(item)).collect()
}

/// Keep the leading run of elements matching `predicate`.
#[must_use]
pub fn take_while<T>(items: Vec<T>, predicate: impl Fn(&T) -> bool) -> Vec<T> {
    items.into_iter().take_while(|item| predicate(item)).collect()
}
