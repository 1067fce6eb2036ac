// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The isolate: one heap, one reactor, one inbox, one interpreter (spec
//! §4.4). Grounded on the teacher's `Process` — a unit handed to a pool for
//! scheduling that owns its own memory — generalized here so the pool
//! schedules the isolate itself rather than a bare memory region, and the
//! isolate in turn owns the heap that region used to be.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use moth_heap::{Heap, HeapConfig};
use moth_interp::Interpreter;
use moth_mailbox::{IsolateId, Mailbox};
use moth_pool::ThreadPool;
use moth_reactor::{Reactor, ReactorBackend, ReactorEvent};
use tracing::{error, info, instrument};

use crate::error::IsolateError;
use crate::registry;

/// One isolate: a heap, a reactor over backend `B`, and the interpreter
/// driving both. `B` is fixed per process (spec §4.2.7: "the isolate never
/// sees the variant"), so every isolate in a run shares the same backend
/// type.
pub struct Isolate<B: ReactorBackend> {
    id: IsolateId,
    heap: Heap,
    reactor: Reactor<B>,
    interp: Box<dyn Interpreter>,
    interrupted: Arc<AtomicBool>,
}

impl<B: ReactorBackend> Isolate<B> {
    /// Build a standalone isolate and register it on the process-global
    /// list, but do not schedule it — callers that want the initial
    /// isolate of a run construct it directly; children go through
    /// [`Self::spawn`] instead.
    ///
    /// # Errors
    /// Returns [`IsolateError::Heap`] if the heap's semispaces cannot be
    /// mapped.
    pub fn new(backend: B, heap_config: HeapConfig, interp: Box<dyn Interpreter>) -> Result<Self, IsolateError> {
        let id = registry::next_isolate_id();
        let heap = Heap::new(heap_config)?;
        let reactor = Reactor::new(backend, Arc::new(Mailbox::new()));
        let interrupted = registry::register(id);
        info!(isolate = id.as_u64(), "isolate created");
        Ok(Self { id, heap, reactor, interp, interrupted })
    }

    #[must_use]
    pub const fn id(&self) -> IsolateId {
        self.id
    }

    #[must_use]
    pub fn mailbox(&self) -> Arc<Mailbox> {
        self.reactor.mailbox()
    }

    /// Spawn a child isolate and submit it to `pool` as a new task (spec
    /// §4.4): a fresh heap, reactor, and mailbox, registered on the global
    /// list before the task starts running. `payload` is delivered to the
    /// child as the first message in its inbox, from `parent`.
    ///
    /// # Errors
    /// Returns [`IsolateError::Heap`] if the child's heap cannot be built,
    /// or [`IsolateError::Pool`] if the pool is already shutting down.
    pub fn spawn(
        pool: &ThreadPool,
        backend: B,
        heap_config: HeapConfig,
        interp: Box<dyn Interpreter>,
        parent: IsolateId,
        payload: Vec<u8>,
    ) -> Result<IsolateId, IsolateError>
    where
        B: Send + 'static,
    {
        let child = Self::new(backend, heap_config, interp)?;
        let child_id = child.id();
        child.mailbox().send(moth_mailbox::Message { sender: parent, payload });
        pool.submit(move || {
            child.run();
        })?;
        Ok(child_id)
    }

    /// The pool task body (spec §4.4): drive the reactor until it returns
    /// an exit code, then unlink this isolate from the global list. Each
    /// dispatched event is routed to the matching [`Interpreter`] method;
    /// the interpreter is responsible for calling
    /// [`moth_interp::ReactorControl::message_epilogue`] afterwards, per
    /// spec §4.2.1.
    #[instrument(skip(self), fields(isolate = self.id.as_u64()))]
    pub fn run(mut self) -> i32 {
        let id = self.id;
        let interrupted = Arc::clone(&self.interrupted);
        let Self {
            mut heap, mut reactor, mut interp, ..
        } = self;

        let outcome = reactor.run(|react, event| {
            if interrupted.load(Ordering::SeqCst) {
                react.interrupt();
                return;
            }
            match event {
                ReactorEvent::Message(message) => interp.dispatch_message(&mut heap, react, message),
                ReactorEvent::TimerFired(_) => interp.dispatch_wakeup(&mut heap, react),
                ReactorEvent::Readiness(ev) => {
                    let mut signal_bits = 0u8;
                    if ev.readable {
                        signal_bits |= 0b01;
                    }
                    if ev.writable {
                        signal_bits |= 0b10;
                    }
                    interp.dispatch_signal(&mut heap, react, ev.handle, 0, signal_bits, 1);
                }
            }
        });

        registry::unregister(id);

        match outcome {
            Ok(code) => {
                info!(isolate = id.as_u64(), code, "isolate exited");
                code
            }
            Err(err) => {
                error!(isolate = id.as_u64(), %err, "reactor poll failed");
                moth_platform::fatal!("reactor poll failed for isolate {}: {err}", id.as_u64());
            }
        }
    }
}
