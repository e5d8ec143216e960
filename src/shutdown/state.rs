//! Process-wide shutdown flag and the wait primitive built on it.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Maximum time a waiter sleeps before re-checking the flag.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One-way "shutdown requested" flag with wait/notify.
///
/// Once set the flag is never cleared.
#[derive(Debug, Default)]
pub struct ShutdownState {
    requested: Mutex<bool>,
    changed: Condvar,
}

impl ShutdownState {
    /// Creates a state with the flag cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the flag and wakes every waiter.
    ///
    /// Returns true if this call performed the false to true transition.
    pub fn request(&self) -> bool {
        let first = {
            let mut requested = self.flag();
            let first = !*requested;
            *requested = true;
            first
        };
        self.changed.notify_all();
        first
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.flag()
    }

    /// Blocks until shutdown is requested.
    pub fn wait(&self) {
        self.wait_with_interval(WAIT_POLL_INTERVAL);
    }

    /// Blocks until shutdown is requested, re-checking at least every
    /// `interval`. The lock is released while suspended.
    pub fn wait_with_interval(&self, interval: Duration) {
        let mut requested = self.flag();
        while !*requested {
            requested = self
                .changed
                .wait_timeout(requested, interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Waits at most `timeout`; returns whether shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self.flag();
        while !*requested {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = (deadline - now).min(WAIT_POLL_INTERVAL);
            requested = self
                .changed
                .wait_timeout(requested, step)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
