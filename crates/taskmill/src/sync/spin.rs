//! Free-standing spin/yield waiting helpers shared by the queue's blocking
//! slots. These are plain functions rather than methods on a type because
//! the predicate they poll differs at every call site.

use std::time::Instant;

use super::WaitOptions;

/// Outcome of a bounded wait attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinResult {
    /// The predicate became true before the deadline.
    Success,
    /// The deadline passed without the predicate becoming true.
    Timeout,
    /// Neither: the spin budget was exhausted and the caller should fall
    /// through to a heavier wait strategy (yielding, then parking).
    Advance,
}

/// Busy-wait on `pred`, bounded by both `deadline` and `opts.spin_max()`.
pub fn spin_pause_until(
    deadline: Option<Instant>,
    opts: &WaitOptions,
    mut pred: impl FnMut() -> bool,
) -> SpinResult {
    if opts.spin_max().is_zero() {
        return SpinResult::Advance;
    }

    let mut t_begin = Instant::now();
    loop {
        if pred() {
            return SpinResult::Success;
        }
        let now = Instant::now();
        if let Some(deadline) = deadline {
            if now >= deadline {
                return SpinResult::Timeout;
            }
        }
        // Defend against a non-monotonic clock putting `now` before
        // `t_begin`: never let the spin window appear to widen.
        t_begin = t_begin.min(now);
        if now >= t_begin + opts.spin_max() {
            return SpinResult::Advance;
        }
        std::hint::spin_loop();
    }
}

/// Cooperative-yield wait on `pred`, bounded only by `deadline`.
pub fn spin_yield_until(deadline: Option<Instant>, mut pred: impl FnMut() -> bool) -> SpinResult {
    loop {
        if pred() {
            return SpinResult::Success;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return SpinResult::Timeout;
            }
        }
        std::thread::yield_now();
    }
}
