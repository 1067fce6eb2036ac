// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The contract between an isolate's reactor and its interpreter (spec
//! §6.4). The core crates never implement bytecode dispatch; they only
//! define what an interpreter must look like from the reactor's side, plus
//! [`NullInterpreter`], a test double sufficient to drive every end-to-end
//! scenario in spec §8 without one.

use std::sync::Arc;
use std::time::Instant;

use moth_heap::Heap;
use moth_mailbox::{IsolateId, Mailbox, Message};
use moth_reactor::{Reactor, ReactorBackend};

/// The subset of [`Reactor`] an interpreter needs, exposed without binding
/// it to a concrete `ReactorBackend` so `Box<dyn Interpreter>` is possible
/// (spec §4.4: an isolate owns "a `Box<dyn Interpreter>`").
pub trait ReactorControl {
    /// See [`Reactor::exit`].
    fn exit(&mut self, code: i32);
    /// See [`Reactor::message_epilogue`].
    fn message_epilogue(&mut self, new_wakeup: Option<Instant>);
}

impl<B: ReactorBackend> ReactorControl for Reactor<B> {
    fn exit(&mut self, code: i32) {
        Reactor::exit(self, code);
    }

    fn message_epilogue(&mut self, new_wakeup: Option<Instant>) {
        Reactor::message_epilogue(self, new_wakeup);
    }
}

/// Consumer of the heap and reactor driving one isolate's bytecode loop
/// (spec §6.4). The reactor owns the message buffer and frees it after
/// `dispatch_message` returns.
pub trait Interpreter: Send {
    fn dispatch_message(&mut self, heap: &mut Heap, reactor: &mut dyn ReactorControl, message: Message);
    fn dispatch_wakeup(&mut self, heap: &mut Heap, reactor: &mut dyn ReactorControl);
    fn dispatch_signal(
        &mut self,
        heap: &mut Heap,
        reactor: &mut dyn ReactorControl,
        handle_id: u32,
        status: i32,
        signal_bits: u8,
        count: usize,
    );
}

/// A test double that counts dispatches and immediately exits, or — when
/// constructed with [`NullInterpreter::with_reply`] — echoes every message
/// payload back to a given mailbox before exiting (the ping/pong scenario
/// of spec §8).
#[derive(Default)]
pub struct NullInterpreter {
    pub message_dispatches: usize,
    pub wakeup_dispatches: usize,
    pub signal_dispatches: usize,
    reply_to: Option<(Arc<Mailbox>, IsolateId)>,
}

impl NullInterpreter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reply(mailbox: Arc<Mailbox>, reply_as: IsolateId) -> Self {
        Self {
            reply_to: Some((mailbox, reply_as)),
            ..Self::default()
        }
    }
}

impl Interpreter for NullInterpreter {
    fn dispatch_message(&mut self, _heap: &mut Heap, reactor: &mut dyn ReactorControl, message: Message) {
        self.message_dispatches += 1;
        if let Some((mailbox, sender)) = &self.reply_to {
            mailbox.send(Message { sender: *sender, payload: message.payload });
        }
        reactor.exit(0);
    }

    fn dispatch_wakeup(&mut self, _heap: &mut Heap, reactor: &mut dyn ReactorControl) {
        self.wakeup_dispatches += 1;
        reactor.exit(0);
    }

    fn dispatch_signal(
        &mut self,
        _heap: &mut Heap,
        reactor: &mut dyn ReactorControl,
        _handle_id: u32,
        _status: i32,
        _signal_bits: u8,
        _count: usize,
    ) {
        self.signal_dispatches += 1;
        reactor.exit(0);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use moth_heap::HeapConfig;

    fn heap() -> Heap {
        Heap::new(HeapConfig::default()).expect("heap construction")
    }

    #[test]
    fn dispatching_a_message_counts_and_exits() {
        let mut heap = heap();
        let mut reactor = Reactor::new(
            moth_reactor::backend::blocking::BlockingBackend::new(),
            Arc::new(Mailbox::new()),
        );
        let mut interp = NullInterpreter::new();
        interp.dispatch_message(
            &mut heap,
            &mut reactor,
            Message { sender: IsolateId::new(1), payload: vec![] },
        );
        assert_eq!(interp.message_dispatches, 1);
        assert_eq!(reactor.exit_code(), Some(0));
    }

    #[test]
    fn with_reply_echoes_the_payload_back() {
        let mut heap = heap();
        let reply_mailbox = Arc::new(Mailbox::new());
        let mut reactor = Reactor::new(
            moth_reactor::backend::blocking::BlockingBackend::new(),
            Arc::new(Mailbox::new()),
        );
        let mut interp = NullInterpreter::with_reply(Arc::clone(&reply_mailbox), IsolateId::new(2));
        interp.dispatch_message(
            &mut heap,
            &mut reactor,
            Message { sender: IsolateId::new(1), payload: vec![42] },
        );
        let reply = reply_mailbox.try_recv().expect("reply enqueued");
        assert_eq!(reply.payload, vec![42]);
        assert_eq!(reply.sender, IsolateId::new(2));
    }
}
