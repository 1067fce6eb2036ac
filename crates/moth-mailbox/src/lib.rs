// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-isolate message queue (spec §4.2, property P7).
//!
//! Messages from the same sender are delivered in the order they were
//! sent; messages from different senders may interleave in any order the
//! scheduler happens to produce. Grounded on the message queue described in
//! `original_source/src/vm/isolate.h`: one mutex-guarded FIFO per isolate,
//! drained by its reactor.

use std::collections::VecDeque;
use std::time::Duration;

use moth_sync::{Monitor, WaitResult};
use tracing::trace;

/// Identifies the isolate that sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsolateId(u64);

impl IsolateId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// A message in transit between isolates. The payload is an opaque,
/// already-serialized byte buffer — encoding what it means is the
/// interpreter's job, not the mailbox's.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: IsolateId,
    pub payload: Vec<u8>,
}

/// Outcome of a bounded-wait receive.
#[derive(Debug)]
pub enum RecvOutcome {
    Message(Message),
    TimedOut,
    Closed,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Message>,
    closed: bool,
}

/// A single isolate's inbox.
#[derive(Debug)]
pub struct Mailbox {
    state: Monitor<State>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Monitor::new(State::default()),
        }
    }

    /// Enqueue a message. Returns `false` (and drops the message) if the
    /// mailbox has been closed.
    pub fn send(&self, message: Message) -> bool {
        let mut guard = self.state.lock();
        if guard.closed {
            trace!(sender = message.sender.as_u64(), "dropped message: mailbox closed");
            return false;
        }
        guard.queue.push_back(message);
        self.state.notify_one();
        true
    }

    /// Take the oldest message, if any, without blocking.
    pub fn try_recv(&self) -> Option<Message> {
        self.state.lock().queue.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until a message arrives or the mailbox is closed.
    pub fn recv(&self) -> Option<Message> {
        let mut guard = self.state.lock();
        loop {
            if let Some(message) = guard.queue.pop_front() {
                return Some(message);
            }
            if guard.closed {
                return None;
            }
            guard = guard.wait();
        }
    }

    /// Block until a message arrives, the mailbox is closed, or `timeout`
    /// elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> RecvOutcome {
        let mut guard = self.state.lock();
        let mut remaining = timeout;
        loop {
            if let Some(message) = guard.queue.pop_front() {
                return RecvOutcome::Message(message);
            }
            if guard.closed {
                return RecvOutcome::Closed;
            }
            let start = std::time::Instant::now();
            let (next_guard, result) = guard.wait_timeout(remaining);
            guard = next_guard;
            if matches!(result, WaitResult::TimedOut) {
                return RecvOutcome::TimedOut;
            }
            remaining = remaining.saturating_sub(start.elapsed());
        }
    }

    /// Close the mailbox: wakes every blocked receiver, and future `send`s
    /// are rejected.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.state.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn messages_from_one_sender_arrive_in_order() {
        let mailbox = Mailbox::new();
        let sender = IsolateId::new(1);
        for i in 0..5u8 {
            assert!(mailbox.send(Message { sender, payload: vec![i] }));
        }
        for i in 0..5u8 {
            assert_eq!(mailbox.try_recv().unwrap().payload, vec![i]);
        }
        assert!(mailbox.try_recv().is_none());
    }

    #[test]
    fn recv_blocks_until_a_message_is_sent() {
        let mailbox = Arc::new(Mailbox::new());
        let sender_side = Arc::clone(&mailbox);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender_side.send(Message {
                sender: IsolateId::new(7),
                payload: vec![1, 2, 3],
            });
        });
        let message = mailbox.recv().expect("message arrives");
        assert_eq!(message.payload, vec![1, 2, 3]);
        handle.join().expect("sender thread");
    }

    #[test]
    fn recv_timeout_reports_timed_out_on_an_empty_mailbox() {
        let mailbox = Mailbox::new();
        assert!(matches!(
            mailbox.recv_timeout(Duration::from_millis(10)),
            RecvOutcome::TimedOut
        ));
    }

    #[test]
    fn closing_wakes_blocked_receivers_with_none() {
        let mailbox = Arc::new(Mailbox::new());
        let closer = Arc::clone(&mailbox);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        assert!(mailbox.recv().is_none());
        handle.join().expect("closer thread");
    }

    #[test]
    fn send_after_close_is_rejected() {
        let mailbox = Mailbox::new();
        mailbox.close();
        assert!(!mailbox.send(Message { sender: IsolateId::new(1), payload: vec![] }));
    }
}
