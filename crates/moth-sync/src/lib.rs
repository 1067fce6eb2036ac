// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Synchronization primitives used throughout the runtime.
//!
//! The reactor, message queue, and thread pool all suspend on a
//! condition-variable wait (spec §5's "suspension points"). Rather than
//! scatter `(Mutex<T>, Condvar)` pairs, this crate provides a single
//! [`Monitor<T>`] type matching `original_source/vm/thread.h`'s `Monitor`
//! class: one lock, one condition variable, `wait`/`wait_until`,
//! `notify_one`/`notify_all`.

mod monitor;
mod thread;

pub use monitor::{Monitor, MonitorGuard, WaitResult};
pub use thread::{JoinHandle, spawn};
