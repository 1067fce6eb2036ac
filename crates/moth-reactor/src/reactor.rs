// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The per-isolate event loop itself, grounded on
//! `original_source/src/vm/message_loop_default.cc` (the backend with no
//! native readiness notification, closest to this struct's
//! platform-independent dispatch order) and the dispatch ordering common
//! to every `message_loop_{epoll,kqueue,iocp}.cc` backend under
//! `original_source/vm/`: one poll, then timers, then OS readiness, then
//! the message queue, in that order, every iteration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moth_mailbox::{Mailbox, Message};
use tracing::instrument;

use crate::error::ReactorError;
use crate::interest::{Interest, ReadinessEvent};
use crate::timers::{TimerId, TimerQueue};
use crate::{RawSource, ReactorBackend};

/// Upper bound on how long a single `poll_once` call blocks when nothing
/// else constrains the wait. `original_source` wakes a blocked poll via a
/// self-pipe (epoll/kqueue) or `PostQueuedCompletionStatus` (IOCP) the
/// instant `PostMessage` is called from another thread; this port instead
/// bounds every otherwise-infinite wait so a message posted while the
/// reactor is asleep is still picked up within one interval, trading a
/// small worst-case latency for not needing a second OS-specific wake
/// primitive per backend.
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The exit code `Reactor::interrupt` sets (spec §4.2.1 `Interrupt`, §6.1,
/// §6.3: "all isolates shut down with exit code 2"). Not the conventional
/// Unix 128+signal convention — the spec's literal value wins.
pub const INTERRUPTED_EXIT_CODE: i32 = 2;

/// One event the interpreter must dispatch, in the order `Reactor::poll`
/// produced them (spec §4.2.2): timers first, then OS readiness in
/// platform order, then queued messages FIFO.
#[derive(Debug)]
pub enum ReactorEvent {
    TimerFired(TimerId),
    Readiness(ReadinessEvent),
    Message(Message),
}

/// A single isolate's cooperative event loop: one backend, one timer
/// queue holding at most one armed "next wakeup" deadline, and the
/// isolate's inbox (spec §4.2).
pub struct Reactor<B: ReactorBackend> {
    backend: B,
    mailbox: Arc<Mailbox>,
    timers: TimerQueue,
    wakeup: Option<TimerId>,
    pending_waits: usize,
    exit_code: Option<i32>,
}

impl<B: ReactorBackend> Reactor<B> {
    pub fn new(backend: B, mailbox: Arc<Mailbox>) -> Self {
        Self {
            backend,
            mailbox,
            timers: TimerQueue::new(),
            wakeup: None,
            pending_waits: 0,
            exit_code: None,
        }
    }

    #[must_use]
    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    /// `AwaitSignal`: subscribe `source` for `interest`. Returns the handle
    /// id to use with [`Self::cancel_signal_wait`].
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if the backend's registration call
    /// fails.
    pub fn await_signal(&mut self, source: RawSource, interest: Interest) -> Result<u32, ReactorError> {
        let handle = self.backend.register(source, interest)?;
        self.pending_waits += 1;
        Ok(handle)
    }

    /// `CancelSignalWait`: withdraw a previous [`Self::await_signal`].
    ///
    /// # Errors
    /// Returns [`ReactorError::NotRegistered`] if `handle` is unknown, or
    /// [`ReactorError::Syscall`] if the backend's deregistration call fails.
    pub fn cancel_signal_wait(&mut self, handle: u32) -> Result<(), ReactorError> {
        self.backend.deregister(handle)?;
        self.pending_waits = self.pending_waits.saturating_sub(1);
        Ok(())
    }

    /// `MessageEpilogue`: replace the pending wakeup deadline, then exit(0)
    /// if there is nothing left to wait for (spec §4.2.1).
    pub fn message_epilogue(&mut self, new_wakeup: Option<Instant>) {
        if let Some(previous) = self.wakeup.take() {
            self.timers.cancel(previous);
        }
        self.wakeup = new_wakeup.map(|deadline| self.timers.arm(deadline));
        if self.pending_waits == 0 && self.wakeup.is_none() && self.mailbox.is_empty() {
            self.exit(0);
        }
    }

    /// `Exit`: mark the reactor for termination; the current dispatch round
    /// still completes.
    pub fn exit(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    /// `Interrupt`: exit with [`INTERRUPTED_EXIT_CODE`].
    pub fn interrupt(&mut self) {
        self.exit(INTERRUPTED_EXIT_CODE);
    }

    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn compute_timeout(&mut self) -> Duration {
        if !self.mailbox.is_empty() {
            return Duration::ZERO;
        }
        match self.timers.next_deadline() {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now { Duration::ZERO } else { (deadline - now).min(MAX_POLL_INTERVAL) }
            }
            None => MAX_POLL_INTERVAL,
        }
    }

    /// Block for one poll cycle and return every event it produced, in
    /// spec §4.2.2 dispatch order: expired timers, then OS readiness, then
    /// queued messages.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if the backend's poll call fails.
    #[instrument(skip(self), name = "reactor_poll")]
    pub fn poll(&mut self) -> Result<Vec<ReactorEvent>, ReactorError> {
        let timeout = self.compute_timeout();
        let readiness = self.backend.poll_once(Some(timeout))?;
        let now = Instant::now();

        let mut events = Vec::with_capacity(readiness.len() + 1);
        for id in self.timers.pop_expired(now) {
            if self.wakeup == Some(id) {
                self.wakeup = None;
            }
            events.push(ReactorEvent::TimerFired(id));
        }
        events.extend(readiness.into_iter().map(ReactorEvent::Readiness));
        while let Some(message) = self.mailbox.try_recv() {
            events.push(ReactorEvent::Message(message));
        }
        Ok(events)
    }

    /// Run the loop until [`Self::exit`]/[`Self::interrupt`] is called (or
    /// `dispatch` calls one of them), returning the exit code (spec
    /// §4.2.1, `Run`). `dispatch` is invoked once per event, in the order
    /// [`Self::poll`] produced them; it is expected to call
    /// [`Self::message_epilogue`] after handling each one.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if a poll call fails.
    pub fn run(&mut self, mut dispatch: impl FnMut(&mut Self, ReactorEvent)) -> Result<i32, ReactorError> {
        loop {
            if let Some(code) = self.exit_code {
                self.mailbox.close();
                return Ok(code);
            }
            let events = self.poll()?;
            for event in events {
                if self.exit_code.is_some() {
                    break;
                }
                dispatch(self, event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::backend::blocking::BlockingBackend;
    use moth_mailbox::IsolateId;

    fn reactor() -> Reactor<BlockingBackend> {
        Reactor::new(BlockingBackend::new(), Arc::new(Mailbox::new()))
    }

    #[test]
    fn exits_immediately_when_nothing_is_pending() {
        let mut react = reactor();
        react.message_epilogue(None);
        let code = react.run(|_, _| unreachable!("no events should be dispatched")).expect("run");
        assert_eq!(code, 0);
    }

    #[test]
    fn dispatches_a_posted_message() {
        let mut react = reactor();
        react.mailbox().send(Message { sender: IsolateId::new(1), payload: vec![9] });
        let mut received = None;
        let code = react
            .run(|react, event| {
                if let ReactorEvent::Message(message) = event {
                    received = Some(message.payload);
                }
                react.message_epilogue(None);
            })
            .expect("run");
        assert_eq!(code, 0);
        assert_eq!(received, Some(vec![9]));
    }

    #[test]
    fn timer_fires_and_then_loop_exits() {
        let mut react = reactor();
        react.message_epilogue(Some(Instant::now()));
        let mut fired = false;
        let code = react
            .run(|react, event| {
                if matches!(event, ReactorEvent::TimerFired(_)) {
                    fired = true;
                }
                react.message_epilogue(None);
            })
            .expect("run");
        assert_eq!(code, 0);
        assert!(fired);
    }

    #[test]
    fn interrupt_sets_the_spec_exit_code() {
        let mut react = reactor();
        react.interrupt();
        assert_eq!(react.exit_code(), Some(INTERRUPTED_EXIT_CODE));
    }
}
