//! Wall-clock waits
//!
//! The inter-source delay has to be honoured to well under a millisecond,
//! which `thread::sleep` alone does not guarantee on every platform. Every
//! wait here stops early once its [`CancelToken`] is cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Portion of a precise sleep spent yielding instead of sleeping
const SPIN_MARGIN: Duration = Duration::from_millis(1);

/// Longest single sleep inside a cancellable wait
const POLL_SLICE: Duration = Duration::from_millis(5);

/// Shared flag that interrupts scheduler waits
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation so later waits run normally
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Block for at least `duration` unless `token` is cancelled first
///
/// A delay too long to express as an [`Instant`] waits for cancellation
/// only. Returns `false` if the wait was cut short.
pub fn precise_sleep(duration: Duration, token: &CancelToken) -> bool {
    match Instant::now().checked_add(duration) {
        Some(deadline) => precise_sleep_until(deadline, token),
        None => {
            while !token.is_cancelled() {
                thread::sleep(POLL_SLICE);
            }
            false
        }
    }
}

/// Block until `deadline`, finishing close to it, unless `token` is
/// cancelled first
///
/// Sleeps in cancellable slices until [`SPIN_MARGIN`] before the deadline,
/// then yields until the monotonic clock reaches it.
pub fn precise_sleep_until(deadline: Instant, token: &CancelToken) -> bool {
    let coarse = deadline.checked_sub(SPIN_MARGIN).unwrap_or(deadline);
    if !wait_until(coarse, token) {
        return false;
    }

    while Instant::now() < deadline {
        if token.is_cancelled() {
            return false;
        }
        thread::yield_now();
    }
    true
}

/// Block until `deadline` unless `token` is cancelled first
///
/// Returns `false` if the wait was cut short.
pub fn wait_until(deadline: Instant, token: &CancelToken) -> bool {
    loop {
        if token.is_cancelled() {
            return false;
        }

        let now = Instant::now();
        if now >= deadline {
            return true;
        }

        thread::sleep((deadline - now).min(POLL_SLICE));
    }
}

/// Poll `done` every few milliseconds until it holds, the deadline passes or
/// the token is cancelled
///
/// Returns `Some(true)` when `done` held, `Some(false)` on timeout and
/// `None` when cancelled.
pub fn poll_until<F>(deadline: Instant, token: &CancelToken, mut done: F) -> Option<bool>
where
    F: FnMut() -> bool,
{
    loop {
        if token.is_cancelled() {
            return None;
        }
        if done() {
            return Some(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Some(false);
        }

        thread::sleep((deadline - now).min(POLL_SLICE));
    }
}
