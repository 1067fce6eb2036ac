// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bounded-idle-lifetime worker thread pool (spec §4.3).
//!
//! Workers are spawned on demand (one per task, when no worker is already
//! idle) and retire themselves after sitting idle for
//! [`PoolConfig::idle_timeout`]. A retiring worker records its id in a
//! join list rather than joining itself; the pool reaps that list lazily,
//! on the next [`ThreadPool::submit`] or during [`ThreadPool::shutdown`].
//!
//! Grounded on `original_source/vm/thread_pool.cc`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use moth_sync::{JoinHandle, Monitor, WaitResult};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors a pool operation can report.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread pool is shutting down; no new tasks are accepted")]
    ShuttingDown,
}

/// Construction parameters for a [`ThreadPool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// How long an idle worker waits for a task before retiring.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5),
        }
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    pending: VecDeque<Task>,
    idle: usize,
    handles: HashMap<u64, JoinHandle<()>>,
    exited: Vec<u64>,
    next_id: u64,
    shutting_down: bool,
}

impl PoolState {
    fn reap(&mut self) {
        for id in std::mem::take(&mut self.exited) {
            if let Some(handle) = self.handles.remove(&id) {
                handle.join();
                trace!(worker = id, "reaped retired worker");
            }
        }
    }
}

/// The pool.
pub struct ThreadPool {
    state: Arc<Monitor<PoolState>>,
    config: PoolConfig,
}

impl ThreadPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            state: Arc::new(Monitor::new(PoolState {
                pending: VecDeque::new(),
                idle: 0,
                handles: HashMap::new(),
                exited: Vec::new(),
                next_id: 0,
                shutting_down: false,
            })),
            config,
        }
    }

    /// Queue `task` for execution, spawning a new worker if none are idle.
    ///
    /// # Errors
    /// Returns [`PoolError::ShuttingDown`] once [`Self::shutdown`] has been
    /// called (invariant J1: no task is accepted once shutdown begins).
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = self.state.lock();
        if guard.shutting_down {
            return Err(PoolError::ShuttingDown);
        }
        guard.reap();
        guard.pending.push_back(Box::new(task));
        let spawn_id = (guard.idle == 0).then(|| {
            let id = guard.next_id;
            guard.next_id += 1;
            id
        });
        drop(guard);
        self.state.notify_one();

        if let Some(id) = spawn_id {
            let state = Arc::clone(&self.state);
            let idle_timeout = self.config.idle_timeout;
            debug!(worker = id, "spawning new pool worker");
            let handle = moth_sync::spawn(format!("moth-pool-{id}"), move || {
                worker_loop(id, &state, idle_timeout);
            });
            self.state.lock().handles.insert(id, handle);
        }
        Ok(())
    }

    /// Reject further tasks and block until every worker has retired and
    /// been joined (invariants J2, J3: tasks already queued still run to
    /// completion, and no worker thread outlives `shutdown`).
    pub fn shutdown(&self) {
        {
            let mut guard = self.state.lock();
            guard.shutting_down = true;
        }
        self.state.notify_all();
        loop {
            let mut guard = self.state.lock();
            guard.reap();
            if guard.handles.is_empty() {
                return;
            }
            let (next_guard, _) = guard.wait_timeout(Duration::from_millis(20));
            guard = next_guard;
            guard.reap();
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        let mut guard = self.state.lock();
        guard.reap();
        guard.handles.len()
    }
}

fn worker_loop(id: u64, state: &Arc<Monitor<PoolState>>, idle_timeout: Duration) {
    loop {
        let mut guard = state.lock();
        guard.idle += 1;
        let task = loop {
            if let Some(task) = guard.pending.pop_front() {
                break Some(task);
            }
            if guard.shutting_down {
                break None;
            }
            let (next_guard, wait_result) = guard.wait_timeout(idle_timeout);
            guard = next_guard;
            if matches!(wait_result, WaitResult::TimedOut) && guard.pending.is_empty() {
                break None;
            }
        };
        guard.idle -= 1;
        match task {
            Some(task) => {
                drop(guard);
                task();
            }
            None => {
                guard.exited.push(id);
                drop(guard);
                state.notify_all();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn submitted_tasks_all_run() {
        let pool = ThreadPool::new(PoolConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("submit");
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn idle_workers_retire_after_the_configured_timeout() {
        let pool = ThreadPool::new(PoolConfig {
            idle_timeout: Duration::from_millis(30),
        });
        pool.submit(|| {}).expect("submit");
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(pool.worker_count(), 0, "idle worker should have retired and been reaped");
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let pool = ThreadPool::new(PoolConfig::default());
        pool.shutdown();
        assert!(matches!(pool.submit(|| {}), Err(PoolError::ShuttingDown)));
    }

    #[test]
    fn shutdown_waits_for_in_flight_tasks_to_complete() {
        let pool = ThreadPool::new(PoolConfig::default());
        let (tx, rx) = mpsc::channel();
        pool.submit(move || {
            std::thread::sleep(Duration::from_millis(50));
            tx.send(()).expect("send completion signal");
        })
        .expect("submit");
        pool.shutdown();
        assert!(rx.try_recv().is_ok(), "task should have finished before shutdown returned");
    }
}
