//! A single shard: one singly-linked chain of [`Node`]s with a sentinel
//! `head` and a free-slot `tail`, mutated through the hold-bit reservation
//! protocol described in the crate's top-level docs.

use super::node::Node;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Outcome of a single attempt to enqueue/dequeue on a shard.
pub(super) enum Attempt<T> {
    /// The operation completed.
    Done(T),
    /// The shard looked empty or contended; caller should retry.
    Retry,
}

pub(super) struct Shard<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    /// First node ever allocated for this shard. `head` only ever advances
    /// forward through the chain and consumed sentinels are never unlinked,
    /// so walking from `origin` at drop time reaches every node the shard
    /// has allocated, including ones `head` has long since passed.
    origin: *mut Node<T>,
}

impl<T> Shard<T> {
    /// Build a shard pre-seeded with `pre_alloc` nodes (minimum 2: a
    /// sentinel plus one free slot).
    pub(super) fn new(pre_alloc: usize) -> Self {
        let count = pre_alloc.max(2);
        let (first, _last) = Node::alloc_chain(count);
        // SAFETY: `first` was just allocated by us and isn't published yet.
        let second = unsafe { (*first).next_ptr() };
        Shard {
            head: AtomicPtr::new(first),
            // `tail` starts one hop past the sentinel so the remaining
            // preallocated nodes sit *ahead of* it, reachable one at a time
            // through the normal `tail` CAS in `try_enqueue` rather than
            // stranded behind an already-maximally-advanced tail.
            tail: AtomicPtr::new(second),
            origin: first,
        }
    }

    /// Attempt to push `v` onto this shard. Returns `Ok(was_empty_before)` on
    /// success, or `Err(v)` to signal the caller should retry (lost a race on
    /// `tail`'s hold bit).
    pub(super) fn try_enqueue(
        &self,
        v: T,
        next_alloc: usize,
    ) -> Result<bool, T> {
        let tail_ptr = self.tail.load(Ordering::Acquire);
        // SAFETY: shard nodes are never freed while the queue is alive.
        let tail = unsafe { &*tail_ptr };
        if tail.is_held() || !tail.try_hold() {
            return Err(v);
        }

        // We hold `tail`. If it has no successor yet, grow the chain before
        // writing, so `tail` always has somewhere to advance to.
        if tail.next_ptr().is_null() {
            let (first, last) = Node::alloc_chain(next_alloc);
            // Link the fresh chain after the current tail. No other thread
            // can be racing this CAS: only the hold-bit winner reaches here,
            // and `next` was null under that same winner's observation.
            tail.set_next(first);
            let _ = last;
        }

        // SAFETY: we hold the reservation on `tail_ptr`.
        unsafe { tail.put(v) };
        tail.release();

        // SAFETY: shard nodes are never freed while the queue is alive.
        let was_empty = unsafe { (*self.head.load(Ordering::Acquire)).next_ptr() } == tail_ptr;
        let next = tail.next_ptr();
        // Advance `tail`; if another thread beat us to it the structure is
        // still consistent (whoever wrote `v` already released the node), so
        // a failed CAS here is not retried — the value is already published.
        let _ = self
            .tail
            .compare_exchange(tail_ptr, next, Ordering::AcqRel, Ordering::Acquire);

        Ok(was_empty)
    }

    /// Attempt to pop the oldest live value from this shard.
    pub(super) fn try_dequeue(&self) -> Attempt<T> {
        let head_ptr = self.head.load(Ordering::Acquire);
        // SAFETY: shard nodes are never freed while the queue is alive.
        let head = unsafe { &*head_ptr };
        let next_ptr = head.next_ptr();
        if next_ptr.is_null() {
            return Attempt::Retry;
        }
        // SAFETY: see above.
        let next = unsafe { &*next_ptr };
        if next.is_held() {
            return Attempt::Retry;
        }
        // The tail may have advanced past `next` already (i.e. `next` holds
        // a live value) or `next` may itself be the free slot just past the
        // last live element; try_hold tells them apart: a writer never holds
        // a node it hasn't written into, so a won hold on a node with no
        // value means we raced the writer and should back off.
        if !next.try_hold() {
            return Attempt::Retry;
        }
        // SAFETY: we hold the reservation on `next_ptr`.
        let value = unsafe { next.take() };
        let Some(value) = value else {
            next.release();
            return Attempt::Retry;
        };
        // `next` becomes the new sentinel. A CAS failure here means another
        // thread already advanced `head` past us, which can't happen because
        // only the thread that wins `next`'s hold may advance `head` to it.
        let advanced = self
            .head
            .compare_exchange(head_ptr, next_ptr, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        debug_assert!(advanced, "head CAS cannot lose once next is held");
        next.release();
        Attempt::Done(value)
    }

    /// Best-effort emptiness check: no live value between `head` and `tail`.
    pub(super) fn looks_empty(&self) -> bool {
        let head_ptr = self.head.load(Ordering::Acquire);
        // SAFETY: shard nodes are never freed while the queue is alive.
        let head = unsafe { &*head_ptr };
        head.next_ptr() == self.tail.load(Ordering::Acquire)
    }
}

impl<T> Drop for Shard<T> {
    fn drop(&mut self) {
        let mut cur = self.origin;
        if cur.is_null() {
            // Should be unreachable — a shard is never structurally null —
            // but the destructor must never panic on a logic bug.
            log::warn!("taskmill: shard origin was null at drop time");
            return;
        }
        while !cur.is_null() {
            // SAFETY: we own the whole chain exclusively during drop, and
            // `origin` reaches every node ever allocated for this shard.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next_ptr();
        }
    }
}

// SAFETY: `origin` is fixed at construction and only read (never mutated or
// raced) from `Drop`, which runs with exclusive access to the shard.
unsafe impl<T: Send> Send for Shard<T> {}
unsafe impl<T: Send> Sync for Shard<T> {}
