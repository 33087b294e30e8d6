//! Stable priority queue for pending task envelopes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::task::{Priority, TaskEnvelope};

/// Items the queue can order.
pub(crate) trait Queued {
    fn priority(&self) -> Priority;
}

impl Queued for TaskEnvelope {
    fn priority(&self) -> Priority {
        self.priority
    }
}

/// Heap entry ordered by priority (highest first), then by enqueue sequence (FIFO).
struct Entry<T> {
    seq: u64,
    item: T,
}

impl<T: Queued> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T: Queued> Eq for Entry<T> {}

impl<T: Queued> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Queued> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.item.priority().cmp(&other.item.priority()) {
            // Lower sequence wins; reversed for the max-heap.
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// Priority heap with a monotonically increasing sequence for FIFO ties.
///
/// O(log n) push and pop; `len` is O(1).
pub(crate) struct TaskQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T: Queued> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { seq, item });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|entry| entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every item matching `dead`, returning how many were dropped.
    pub fn prune(&mut self, dead: impl Fn(&T) -> bool) -> usize {
        let before = self.heap.len();
        self.heap.retain(|entry| !dead(&entry.item));
        before - self.heap.len()
    }

    /// Take everything, highest priority first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }
}
