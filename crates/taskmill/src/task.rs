//! The unit of work a [`crate::pool::WorkerPool`] drains from its queue, and
//! the one-shot handle a caller uses to collect its result.
//!
//! The pool's queue is monomorphic (`ShardedUnboundedQueue<Job>`), so a
//! submitted `FnOnce() -> Result<T, E>` is erased behind a single boxed
//! closure that runs the user function, catches any panic, and reports the
//! outcome through an `mpsc` one-shot channel. That closure *is* the Task in
//! this crate: there is no separate struct to invoke, because invocation and
//! result delivery are inseparable once the closure is boxed.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::error::FutureError;

/// A type-erased unit of work accepted by the pool. Invoking it runs the
/// user closure and publishes the outcome to its paired [`JobHandle`]; it is
/// safe to drop without invoking (the handle then resolves to `Cancelled`).
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum Outcome<T, E> {
    Value(T),
    UserError(E),
    Panicked(String),
}

/// The caller's reference to a submitted task's one-shot result channel.
///
/// `get()` blocks until the task has run exactly once; `try_get()` never
/// blocks. Calling either a second time after a successful call returns
/// [`FutureError::AlreadyTaken`] rather than blocking forever or silently
/// duplicating a value that may not even be `Clone`.
pub struct JobHandle<T, E> {
    rx: Receiver<Outcome<T, E>>,
    taken: Cell<bool>,
}

// The receiver end is only ever touched by whichever thread holds the
// handle; `Cell` needs no synchronization beyond that single-owner use.
unsafe impl<T: Send, E: Send> Send for JobHandle<T, E> {}

impl<T, E> JobHandle<T, E> {
    /// Block until the task's outcome arrives, then return it. A second call
    /// after a successful first call returns `Err(FutureError::AlreadyTaken)`.
    pub fn get(&self) -> Result<T, FutureError<E>> {
        if self.taken.get() {
            return Err(FutureError::AlreadyTaken);
        }
        let resolved = match self.rx.recv() {
            Ok(Outcome::Value(v)) => Ok(v),
            Ok(Outcome::UserError(e)) => Err(FutureError::UserError(e)),
            Ok(Outcome::Panicked(msg)) => Err(FutureError::Panicked(msg)),
            Err(_) => Err(FutureError::Cancelled),
        };
        self.taken.set(true);
        resolved
    }

    /// Non-blocking variant of [`JobHandle::get`]: `None` if the task hasn't
    /// produced an outcome yet, `Some` otherwise (including on cancellation).
    pub fn try_get(&self) -> Option<Result<T, FutureError<E>>> {
        if self.taken.get() {
            return Some(Err(FutureError::AlreadyTaken));
        }
        let resolved = match self.rx.try_recv() {
            Ok(Outcome::Value(v)) => Ok(v),
            Ok(Outcome::UserError(e)) => Err(FutureError::UserError(e)),
            Ok(Outcome::Panicked(msg)) => Err(FutureError::Panicked(msg)),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(FutureError::Cancelled),
        };
        self.taken.set(true);
        Some(resolved)
    }
}

/// Wrap `f` as a boxed [`Job`] plus the [`JobHandle`] that will receive its
/// outcome. The job catches panics from `f` at its own boundary so a worker
/// thread invoking it never unwinds past the call site.
pub(crate) fn make_job<F, T, E>(f: F) -> (Job, JobHandle<T, E>)
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx): (Sender<Outcome<T, E>>, Receiver<Outcome<T, E>>) = mpsc::channel();
    let job: Job = Box::new(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(v)) => Outcome::Value(v),
            Ok(Err(e)) => Outcome::UserError(e),
            Err(payload) => Outcome::Panicked(panic_message(payload)),
        };
        // A disconnected receiver means the handle was dropped; nothing to
        // deliver to, and that's not this job's problem.
        let _ = tx.send(outcome);
    });
    (
        job,
        JobHandle {
            rx,
            taken: Cell::new(false),
        },
    )
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_job_resolves_value() {
        let (job, handle) = make_job::<_, i32, ()>(|| Ok(42));
        job();
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn user_error_is_forwarded_verbatim() {
        let (job, handle) = make_job::<_, i32, &'static str>(|| Err("boom"));
        job();
        match handle.get() {
            Err(FutureError::UserError("boom")) => {}
            other => panic!("expected UserError(\"boom\"), got {other:?}"),
        }
    }

    #[test]
    fn panicking_job_resolves_to_panicked() {
        let (job, handle) = make_job::<_, i32, ()>(|| panic!("kaboom"));
        job();
        match handle.get() {
            Err(FutureError::Panicked(msg)) => assert!(msg.contains("kaboom")),
            other => panic!("expected Panicked, got {other:?}"),
        }
    }

    #[test]
    fn dropping_job_without_invoking_resolves_cancelled() {
        let (job, handle) = make_job::<_, i32, ()>(|| Ok(1));
        drop(job);
        assert!(matches!(handle.get(), Err(FutureError::Cancelled)));
    }

    #[test]
    fn second_get_after_success_is_already_taken() {
        let (job, handle) = make_job::<_, i32, ()>(|| Ok(7));
        job();
        assert_eq!(handle.get().unwrap(), 7);
        assert!(matches!(handle.get(), Err(FutureError::AlreadyTaken)));
    }

    #[test]
    fn try_get_returns_none_before_invocation() {
        let (job, handle) = make_job::<_, i32, ()>(|| Ok(1));
        assert!(handle.try_get().is_none());
        job();
        assert_eq!(handle.try_get().unwrap().unwrap(), 1);
    }
}
