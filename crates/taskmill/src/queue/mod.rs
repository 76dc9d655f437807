//! A multi-producer/multi-consumer queue built from independent shards, each
//! a singly-linked free-list mutated through a per-node "hold" reservation
//! bit rather than a shard-wide lock. Shard selection is round-robin, not a
//! work-stealing or load-balancing scheme; FIFO order is only guaranteed
//! within a single shard.
//!
//! Nodes are never individually reclaimed while the queue is alive — a
//! shard's chain only ever grows. This sidesteps the ABA and use-after-free
//! hazards a reclaiming design would need epochs or hazard pointers for, at
//! the cost of retaining every node a shard has ever allocated until the
//! queue itself is dropped.

mod node;
mod shard;

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

use crate::error::QueueError;
use crate::sync::{SaturatingSemaphore, WaitOptions};

use shard::{Attempt, Shard};

/// Tunables for [`ShardedUnboundedQueue`]. `Copy` and constructed
/// independently of the queue so callers can unit-test sizing decisions
/// without touching a live queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    shards: usize,
    pre_alloc_nodes: usize,
    next_alloc_nodes: usize,
    max_contend_retries: usize,
}

impl QueueConfig {
    pub const DEFAULT_SHARDS: usize = 8;
    pub const DEFAULT_PRE_ALLOC_NODES: usize = 512;
    pub const DEFAULT_NEXT_ALLOC_NODES: usize = 32;
    pub const DEFAULT_MAX_CONTEND_RETRIES: usize = 32;

    pub fn new() -> Self {
        Self {
            shards: Self::DEFAULT_SHARDS,
            pre_alloc_nodes: Self::DEFAULT_PRE_ALLOC_NODES,
            next_alloc_nodes: Self::DEFAULT_NEXT_ALLOC_NODES,
            max_contend_retries: Self::DEFAULT_MAX_CONTEND_RETRIES,
        }
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_pre_alloc_nodes(mut self, pre_alloc_nodes: usize) -> Self {
        self.pre_alloc_nodes = pre_alloc_nodes;
        self
    }

    pub fn with_next_alloc_nodes(mut self, next_alloc_nodes: usize) -> Self {
        self.next_alloc_nodes = next_alloc_nodes;
        self
    }

    pub fn with_max_contend_retries(mut self, max_contend_retries: usize) -> Self {
        self.max_contend_retries = max_contend_retries;
        self
    }

    fn validate(&self) -> Result<(), QueueError> {
        if self.shards == 0 || !self.shards.is_power_of_two() {
            return Err(QueueError::InvalidConfig {
                reason: format!("shards must be a nonzero power of two, got {}", self.shards),
            });
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShardedUnboundedQueue<T> {
    // Each shard is mutated independently by whichever producer/consumer
    // lands on it; padding to a cache line keeps one shard's CAS traffic
    // from bouncing the line backing its neighbors.
    shards: Box<[CachePadded<Shard<T>>]>,
    shard_mask: usize,
    enq_idx: AtomicUsize,
    deq_idx: AtomicUsize,
    size: AtomicI64,
    not_empty: SaturatingSemaphore,
    next_alloc_nodes: usize,
    max_contend_retries: usize,
}

impl<T> ShardedUnboundedQueue<T> {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default()).expect("default QueueConfig is always valid")
    }

    pub fn with_config(cfg: QueueConfig) -> Result<Self, QueueError> {
        cfg.validate()?;
        let per_shard = (cfg.pre_alloc_nodes / cfg.shards).max(2);
        let shards: Box<[CachePadded<Shard<T>>]> = (0..cfg.shards)
            .map(|_| CachePadded::new(Shard::new(per_shard)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            shard_mask: shards.len() - 1,
            shards,
            enq_idx: AtomicUsize::new(0),
            deq_idx: AtomicUsize::new(0),
            size: AtomicI64::new(0),
            not_empty: SaturatingSemaphore::new(),
            next_alloc_nodes: cfg.next_alloc_nodes,
            max_contend_retries: cfg.max_contend_retries,
        })
    }

    /// Insert `v`. Never blocks; retries internally against lost CAS races
    /// and wakes one waiter if the queue was empty before this insertion.
    pub fn enqueue(&self, mut v: T) {
        loop {
            let idx = self.enq_idx.fetch_add(1, Ordering::Relaxed) & self.shard_mask;
            let shard = &self.shards[idx];
            match shard.try_enqueue(v, self.next_alloc_nodes) {
                Ok(was_empty) => {
                    let prior = self.size.fetch_add(1, Ordering::AcqRel);
                    if log::log_enabled!(log::Level::Trace) {
                        log::trace!("taskmill: enqueued onto shard {idx}, size now {}", prior + 1);
                    }
                    if was_empty {
                        self.not_empty.post();
                    }
                    return;
                }
                Err(rejected) => {
                    v = rejected;
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Pop the next value, blocking (spin -> yield -> park) while the queue
    /// is empty.
    pub fn dequeue(&self) -> T {
        loop {
            if let Some(v) = self.try_dequeue_inner() {
                return v;
            }
            // The semaphore saturates on `post` and never clears itself, so
            // a waiter must reset it before parking. Reset-then-recheck
            // (rather than recheck-then-reset) closes the window where an
            // enqueue posts between our failed attempt above and the reset:
            // that enqueue's value is already published by the time it
            // posts, so the recheck below still observes it even though the
            // reset just cleared the flag that would otherwise have woken us.
            self.not_empty.reset();
            if let Some(v) = self.try_dequeue_inner() {
                return v;
            }
            self.not_empty.try_wait_until(None, &WaitOptions::new());
            // Woken (or spuriously resumed); loop back to shard selection.
        }
    }

    /// Non-blocking variant: gives up after `max_contend_retries` failed
    /// attempts across shards rather than parking.
    pub fn try_dequeue(&self) -> Option<T> {
        self.try_dequeue_inner()
    }

    fn try_dequeue_inner(&self) -> Option<T> {
        for _ in 0..self.max_contend_retries {
            let idx = self.deq_idx.fetch_add(1, Ordering::Relaxed) & self.shard_mask;
            let shard = &self.shards[idx];
            match shard.try_dequeue() {
                Attempt::Done(v) => {
                    let prior = self.size.fetch_sub(1, Ordering::AcqRel);
                    if log::log_enabled!(log::Level::Trace) {
                        log::trace!("taskmill: dequeued from shard {idx}, size now {}", prior - 1);
                    }
                    if prior - 1 > 0 {
                        // More work remains; let other waiters keep trying.
                        self.not_empty.post();
                    }
                    return Some(v);
                }
                Attempt::Retry => std::thread::yield_now(),
            }
        }
        None
    }

    /// Advisory snapshot of the number of live elements.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire).max(0) as usize
    }

    /// Advisory emptiness check equivalent to `len() == 0`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn looks_empty_all_shards(&self) -> bool {
        self.shards.iter().all(|s| s.looks_empty())
    }
}

impl<T> Default for ShardedUnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Send> Send for ShardedUnboundedQueue<T> {}
unsafe impl<T: Send> Sync for ShardedUnboundedQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn single_thread_fifo_round_trip() {
        let q: ShardedUnboundedQueue<i32> = ShardedUnboundedQueue::new();
        for i in 0..2000 {
            q.enqueue(i);
        }
        let mut seen = HashSet::new();
        for _ in 0..2000 {
            seen.insert(q.dequeue());
        }
        assert_eq!(seen.len(), 2000);
        assert!(q.is_empty());
        assert!(q.looks_empty_all_shards());
    }

    #[test]
    fn try_dequeue_on_empty_queue_returns_none() {
        let q: ShardedUnboundedQueue<i32> = ShardedUnboundedQueue::new();
        assert_eq!(q.try_dequeue(), None);
    }

    #[test]
    fn len_tracks_successful_enqueues_and_dequeues() {
        let q: ShardedUnboundedQueue<i32> = ShardedUnboundedQueue::new();
        assert_eq!(q.len(), 0);
        q.enqueue(1);
        q.enqueue(2);
        assert_eq!(q.len(), 2);
        q.dequeue();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn blocking_dequeue_unblocked_by_delayed_enqueue() {
        let q = Arc::new(ShardedUnboundedQueue::<i32>::new());
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.dequeue());
        std::thread::sleep(std::time::Duration::from_millis(20));
        q.enqueue(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn eight_producers_eight_consumers_preserve_total() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 2000;
        let q = Arc::new(ShardedUnboundedQueue::<usize>::new());

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.enqueue(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let total = PRODUCERS * PER_PRODUCER;
        let mut seen = HashSet::with_capacity(total);
        for _ in 0..total {
            seen.insert(q.dequeue());
        }
        assert_eq!(seen.len(), total);
        assert!(q.is_empty());
    }

    #[test]
    fn config_rejects_non_power_of_two_shards() {
        let cfg = QueueConfig::default().with_shards(3);
        assert!(ShardedUnboundedQueue::<i32>::with_config(cfg).is_err());
    }

    #[test]
    fn config_rejects_zero_shards() {
        let cfg = QueueConfig::default().with_shards(0);
        assert!(ShardedUnboundedQueue::<i32>::with_config(cfg).is_err());
    }
}
