// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! `Monitor`: a mutex paired with its condition variable.
//!
//! Grounded on `original_source/vm/thread.h`'s `Monitor` class, which is the
//! only synchronization primitive the source uses above raw OS mutexes —
//! the message queue, the thread pool's idle wait, and `Isolate::Interrupt`
//! all wait on one.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Whether a [`Monitor::wait_timeout`] returned because it was notified or
/// because the timeout elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken by a notification (or a spurious wakeup the caller's predicate
    /// resolved to "stop waiting").
    Notified,
    /// The timeout elapsed before any notification satisfied the predicate.
    TimedOut,
}

/// A value protected by a mutex, with a condition variable for waiting on
/// changes to it.
pub struct Monitor<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

/// A held lock on a [`Monitor`]; derefs to `&T`/`&mut T` like a
/// [`MutexGuard`].
pub struct MonitorGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    condvar: &'a Condvar,
}

impl<T> Monitor<T> {
    /// Wrap `value` in a new monitor.
    pub const fn new(value: T) -> Self {
        Self {
            mutex: Mutex::new(value),
            condvar: Condvar::new(),
        }
    }

    /// Acquire the lock, blocking until it is available.
    ///
    /// # Panics
    /// Panics if the monitor's internal mutex is poisoned (a prior holder
    /// panicked while holding it) — matching the existing codebase's policy
    /// of treating a poisoned lock as a programming error worth crashing on,
    /// not a recoverable I/O condition.
    pub fn lock(&self) -> MonitorGuard<'_, T> {
        let guard = self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        MonitorGuard {
            guard,
            condvar: &self.condvar,
        }
    }

    /// Wake one thread blocked in [`MonitorGuard::wait`].
    pub fn notify_one(&self) {
        self.condvar.notify_one();
    }

    /// Wake every thread blocked in [`MonitorGuard::wait`].
    pub fn notify_all(&self) {
        self.condvar.notify_all();
    }
}

impl<'a, T> MonitorGuard<'a, T> {
    /// Release the lock and block until notified, then reacquire it.
    ///
    /// Returns a fresh guard (the old one is consumed, matching
    /// `Condvar::wait`'s semantics of moving the guard through the wait).
    #[must_use]
    pub fn wait(self) -> Self {
        let guard = self
            .condvar
            .wait(self.guard)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            guard,
            condvar: self.condvar,
        }
    }

    /// Block until notified or `timeout` elapses, whichever comes first.
    #[must_use]
    pub fn wait_timeout(self, timeout: Duration) -> (Self, WaitResult) {
        let (guard, result) = self
            .condvar
            .wait_timeout(self.guard, timeout)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let status = if result.timed_out() {
            WaitResult::TimedOut
        } else {
            WaitResult::Notified
        };
        (
            Self {
                guard,
                condvar: self.condvar,
            },
            status,
        )
    }
}

impl<T> std::ops::Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn notify_one_wakes_waiter() {
        let monitor = Arc::new(Monitor::new(false));
        let waiter = Arc::clone(&monitor);

        let handle = std::thread::spawn(move || {
            let mut guard = waiter.lock();
            while !*guard {
                guard = guard.wait();
            }
        });

        std::thread::sleep(Duration::from_millis(10));
        *monitor.lock() = true;
        monitor.notify_one();

        handle.join().expect("waiter thread panicked");
    }

    #[test]
    fn wait_timeout_reports_timed_out_when_never_notified() {
        let monitor = Monitor::new(());
        let guard = monitor.lock();
        let (_guard, result) = guard.wait_timeout(Duration::from_millis(20));
        assert_eq!(result, WaitResult::TimedOut);
    }
}
