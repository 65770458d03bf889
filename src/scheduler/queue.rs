//! Ready structure for the scheduler
//!
//! Priority-bucketed FIFO queue. Tasks of equal priority keep their start
//! order, so popping always yields the task with the smallest
//! `(priority, sequence)` pair. A preempted task re-enters at the front of
//! its bucket: it necessarily carries the smallest sequence in its tier.

use std::collections::{BTreeMap, VecDeque};

use super::task::TaskId;

/// Priority-bucketed ready queue.
///
/// `capacity` pre-sizes a dense bucket vector for the common low priorities;
/// priorities beyond it spill into an ordered overflow map, so memory is
/// proportional to queued tasks and never to the priority value itself.
/// Priority `p` (positive, smaller = more urgent) maps to bucket `p - 1`.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    buckets: Vec<VecDeque<TaskId>>,
    overflow: BTreeMap<u32, VecDeque<TaskId>>,
    len: usize,
}

impl ReadyQueue {
    /// Create a queue with `capacity` pre-sized priority buckets.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, VecDeque::new);
        Self {
            buckets,
            overflow: BTreeMap::new(),
            len: 0,
        }
    }

    #[inline]
    fn tier_mut(
        &mut self,
        priority: u32,
    ) -> &mut VecDeque<TaskId> {
        let idx = priority.saturating_sub(1) as usize;
        if idx < self.buckets.len() {
            &mut self.buckets[idx]
        } else {
            self.overflow.entry(priority).or_default()
        }
    }

    /// Append a task to its priority tier (start order).
    pub fn push_back(
        &mut self,
        priority: u32,
        id: TaskId,
    ) {
        self.tier_mut(priority).push_back(id);
        self.len += 1;
    }

    /// Re-insert a preempted task at the front of its tier.
    pub fn push_front(
        &mut self,
        priority: u32,
        id: TaskId,
    ) {
        self.tier_mut(priority).push_front(id);
        self.len += 1;
    }

    /// Pop the most urgent task: smallest `(priority, sequence)`.
    pub fn pop(&mut self) -> Option<TaskId> {
        for bucket in self.buckets.iter_mut() {
            if let Some(id) = bucket.pop_front() {
                self.len -= 1;
                return Some(id);
            }
        }
        let mut entry = self.overflow.first_entry()?;
        let id = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if id.is_some() {
            self.len -= 1;
        }
        id
    }

    /// Priority of the most urgent queued task, if any.
    pub fn min_priority(&self) -> Option<u32> {
        self.buckets
            .iter()
            .position(|bucket| !bucket.is_empty())
            .map(|idx| idx as u32 + 1)
            .or_else(|| self.overflow.keys().next().copied())
    }

    /// Remove a task from its tier. Returns whether it was present.
    pub fn remove(
        &mut self,
        priority: u32,
        id: TaskId,
    ) -> bool {
        let idx = priority.saturating_sub(1) as usize;
        if idx < self.buckets.len() {
            let bucket = &mut self.buckets[idx];
            let Some(pos) = bucket.iter().position(|queued| *queued == id) else {
                return false;
            };
            bucket.remove(pos);
            self.len -= 1;
            return true;
        }
        let Some(bucket) = self.overflow.get_mut(&priority) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|queued| *queued == id) else {
            return false;
        };
        bucket.remove(pos);
        if bucket.is_empty() {
            self.overflow.remove(&priority);
        }
        self.len -= 1;
        true
    }

    /// Get the number of queued tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
