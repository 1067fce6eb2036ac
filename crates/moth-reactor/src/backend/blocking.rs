// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! A portable [`ReactorBackend`] with no real I/O multiplexing.
//!
//! There is no equivalent in `original_source/` — every platform there has
//! a real polling primitive. This backend exists for targets without one
//! (and for tests): readiness is injected by calling [`BlockingBackend::mark_ready`]
//! from another thread, and `poll_once` parks on a [`Monitor`] until an event
//! arrives or the timeout elapses.

use std::collections::VecDeque;
use std::time::Duration;

use moth_sync::{Monitor, WaitResult};

use crate::error::ReactorError;
use crate::handles::HandleTable;
use crate::interest::{Interest, ReadinessEvent};
use crate::{RawSource, ReactorBackend};

/// Blocking fallback backend: tracks registrations in a [`HandleTable`] and
/// delivers readiness only when told to via [`mark_ready`](Self::mark_ready).
pub struct BlockingBackend {
    registered: HandleTable<(RawSource, Interest)>,
    pending: Monitor<VecDeque<ReadinessEvent>>,
}

impl BlockingBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registered: HandleTable::new(),
            pending: Monitor::new(VecDeque::new()),
        }
    }

    /// Inject a readiness event as if the OS had delivered it. The handle
    /// must still be registered; otherwise this is a no-op.
    pub fn mark_ready(&self, event: ReadinessEvent) {
        if self.registered.get(event.handle).is_none() {
            return;
        }
        let mut queue = self.pending.lock();
        queue.push_back(event);
        drop(queue);
        self.pending.notify_all();
    }
}

impl Default for BlockingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactorBackend for BlockingBackend {
    fn register(&mut self, source: RawSource, interest: Interest) -> Result<u32, ReactorError> {
        Ok(self.registered.insert((source, interest)))
    }

    fn modify(&mut self, handle: u32, interest: Interest) -> Result<(), ReactorError> {
        let slot = self
            .registered
            .get_mut(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        slot.1 = interest;
        Ok(())
    }

    fn deregister(&mut self, handle: u32) -> Result<(), ReactorError> {
        self.registered
            .remove(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        Ok(())
    }

    fn poll_once(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadinessEvent>, ReactorError> {
        let mut guard = self.pending.lock();
        if guard.is_empty() {
            guard = match timeout {
                Some(timeout) => {
                    let (guard, result) = guard.wait_timeout(timeout);
                    if result == WaitResult::TimedOut {
                        return Ok(Vec::new());
                    }
                    guard
                }
                None => guard.wait(),
            };
        }
        Ok(guard.drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn poll_once_times_out_with_no_events() {
        let mut backend = BlockingBackend::new();
        let events = backend.poll_once(Some(Duration::from_millis(10))).expect("poll");
        assert!(events.is_empty());
    }

    #[test]
    fn registered_handle_can_be_marked_ready() {
        let mut backend = BlockingBackend::new();
        let handle = backend.register(0, Interest::READABLE).expect("register");
        backend.mark_ready(ReadinessEvent { handle, readable: true, writable: false });

        let events = backend.poll_once(Some(Duration::from_secs(5))).expect("poll");
        assert_eq!(events, vec![ReadinessEvent { handle, readable: true, writable: false }]);
    }

    #[test]
    fn mark_ready_for_unregistered_handle_is_dropped() {
        let mut backend = BlockingBackend::new();
        backend.mark_ready(ReadinessEvent { handle: 42, readable: true, writable: false });
        let events = backend.poll_once(Some(Duration::from_millis(10))).expect("poll");
        assert!(events.is_empty());
    }

    #[test]
    fn deregistering_unknown_handle_errors() {
        let mut backend = BlockingBackend::new();
        assert!(matches!(
            backend.deregister(99),
            Err(ReactorError::NotRegistered { handle: 99 })
        ));
    }
}
