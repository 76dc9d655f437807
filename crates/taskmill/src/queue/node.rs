//! Node representation for a shard's singly-linked free-list.
//!
//! Nodes are allocated in batches (see [`super::shard::Shard::grow`]) and
//! live until the owning [`super::ShardedUnboundedQueue`] is dropped. A node
//! is either the shard's sentinel (no live value, pointed to by `head`), a
//! live element somewhere between `head` and `tail`, or a pre-allocated free
//! slot past `tail`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// One slot in a shard's node chain.
///
/// `value` is accessed through an `UnsafeCell` because ordinary `&mut`
/// aliasing rules can't express "exclusive access granted by winning the
/// `hold` CAS" — the hold bit *is* the synchronization, the `UnsafeCell` just
/// lets the compiler get out of the way.
pub(super) struct Node<T> {
    value: UnsafeCell<Option<T>>,
    next: AtomicPtr<Node<T>>,
    hold: AtomicBool,
}

unsafe impl<T: Send> Send for Node<T> {}
unsafe impl<T: Send> Sync for Node<T> {}

impl<T> Node<T> {
    pub(super) fn new() -> Box<Node<T>> {
        Box::new(Node {
            value: UnsafeCell::new(None),
            next: AtomicPtr::new(std::ptr::null_mut()),
            hold: AtomicBool::new(false),
        })
    }

    /// Chain `count` fresh nodes together and return (first, last) raw
    /// pointers. Ownership of the whole chain transfers to the caller.
    pub(super) fn alloc_chain(count: usize) -> (*mut Node<T>, *mut Node<T>) {
        assert!(count > 0, "alloc_chain requires at least one node");
        let head = Box::into_raw(Node::new());
        let mut tail = head;
        for _ in 1..count {
            let next = Box::into_raw(Node::new());
            // SAFETY: `tail` was just allocated by us and isn't published yet.
            unsafe { (*tail).next.store(next, Ordering::Release) };
            tail = next;
        }
        (head, tail)
    }

    #[inline]
    pub(super) fn next_ptr(&self) -> *mut Node<T> {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn set_next(&self, next: *mut Node<T>) {
        self.next.store(next, Ordering::Release);
    }

    #[inline]
    pub(super) fn cas_next(&self, current: *mut Node<T>, new: *mut Node<T>) -> bool {
        self.next
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Try to reserve this node for exclusive access. Returns `true` on
    /// success; the caller must release with [`Node::release`] afterward.
    #[inline]
    pub(super) fn try_hold(&self) -> bool {
        self.hold
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub(super) fn is_held(&self) -> bool {
        self.hold.load(Ordering::Acquire)
    }

    #[inline]
    pub(super) fn release(&self) {
        self.hold.store(false, Ordering::Release);
    }

    /// Write `v` into the node's value slot. Caller must hold the reservation.
    ///
    /// # Safety
    /// Caller must have won `try_hold` on this node and must not be racing
    /// any other reader/writer of `value`.
    #[inline]
    pub(super) unsafe fn put(&self, v: T) {
        *self.value.get() = Some(v);
    }

    /// Take the node's value, leaving `None` behind. Caller must hold the
    /// reservation.
    ///
    /// # Safety
    /// Same requirement as [`Node::put`].
    #[inline]
    pub(super) unsafe fn take(&self) -> Option<T> {
        (*self.value.get()).take()
    }
}
