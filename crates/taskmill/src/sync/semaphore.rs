//! A one-shot, idempotent, many-poster/many-waiter signal. Once [`post`] has
//! been observed by a waiter, every subsequent wait succeeds immediately
//! until [`reset`] is called.
//!
//! [`post`]: SaturatingSemaphore::post
//! [`reset`]: SaturatingSemaphore::reset

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::spin::{spin_pause_until, spin_yield_until, SpinResult};
use super::WaitOptions;

const NOT_READY: u32 = 0;
const READY: u32 = 1;
const BLOCKED: u32 = 2;

pub struct SaturatingSemaphore {
    state: AtomicU32,
    // Only touched by waiters that fell all the way through to parking, and
    // by `post` when it needs to wake them. The mutex guards nothing but the
    // condvar's own protocol.
    park: Mutex<()>,
    condvar: Condvar,
}

impl SaturatingSemaphore {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(NOT_READY),
            park: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    #[inline]
    pub fn ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    pub fn reset(&self) {
        self.state.store(NOT_READY, Ordering::Release);
    }

    /// Post the signal, waking any parked waiters. Idempotent: posting an
    /// already-ready semaphore is a no-op.
    pub fn post(&self) {
        if self
            .state
            .compare_exchange(NOT_READY, READY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
        // Lost the NotReady->Ready race: either someone else already posted
        // (fine, nothing to do) or a waiter is Blocked and needs waking.
        loop {
            match self.state.compare_exchange(
                BLOCKED,
                READY,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let _guard = self.park.lock();
                    self.condvar.notify_all();
                    return;
                }
                Err(READY) => return,
                Err(_) => continue,
            }
        }
    }

    #[inline]
    pub fn try_wait(&self) -> bool {
        self.ready()
    }

    /// Wait until ready or `deadline`, spinning then yielding then parking.
    pub fn try_wait_until(&self, deadline: Option<Instant>, opts: &WaitOptions) -> bool {
        if self.ready() {
            return true;
        }

        match spin_pause_until(deadline, opts, || self.ready()) {
            SpinResult::Success => return true,
            SpinResult::Timeout => return false,
            SpinResult::Advance => {}
        }

        match spin_yield_until(deadline, || self.ready()) {
            SpinResult::Success => return true,
            SpinResult::Timeout => return false,
            SpinResult::Advance => {}
        }

        loop {
            if self.ready() {
                return true;
            }
            match self.state.compare_exchange(
                NOT_READY,
                BLOCKED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) | Err(BLOCKED) => {}
                Err(_) => {
                    // Flipped to Ready while we were trying to park.
                    return true;
                }
            }

            let mut guard = self.park.lock();
            if self.ready() {
                return true;
            }
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                let timed_out = self
                    .condvar
                    .wait_for(&mut guard, deadline - now)
                    .timed_out();
                drop(guard);
                if self.ready() {
                    return true;
                }
                if timed_out && Instant::now() >= deadline {
                    return false;
                }
            } else {
                self.condvar.wait(&mut guard);
            }
        }
    }

    pub fn try_wait_for(&self, duration: Duration, opts: &WaitOptions) -> bool {
        self.try_wait_until(Some(Instant::now() + duration), opts)
    }
}

impl Default for SaturatingSemaphore {
    fn default() -> Self {
        Self::new()
    }
}
