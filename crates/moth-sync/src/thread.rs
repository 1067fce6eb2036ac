// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Thread start/join facade.
//!
//! Grounded on `original_source/vm/thread.h`/`thread_posix.cc`: a thin named
//! wrapper over OS thread creation so the thread pool (spec §4.3) can name
//! its workers for debugging without depending on `std::thread` directly
//! throughout the codebase.

/// A spawned OS thread, joined on demand.
pub struct JoinHandle<T> {
    inner: std::thread::JoinHandle<T>,
}

impl<T> JoinHandle<T> {
    /// Block until the thread finishes, returning its result.
    ///
    /// # Panics
    /// Panics if the thread itself panicked, propagating the panic payload
    /// (matching `std::thread::JoinHandle::join`'s behaviour).
    pub fn join(self) -> T {
        match self.inner.join() {
            Ok(value) => value,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    /// The OS thread id, used as the join-list key in the thread pool.
    #[must_use]
    pub fn id(&self) -> std::thread::ThreadId {
        self.inner.thread().id()
    }
}

/// Spawn a named OS thread running `f`.
pub fn spawn<F, T>(name: impl Into<String>, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let inner = std::thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .expect("failed to spawn OS thread");
    JoinHandle { inner }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn spawn_and_join_returns_value() {
        let handle = spawn("test-worker", || 1 + 1);
        assert_eq!(handle.join(), 2);
    }
}
