// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The process-global isolate registry (spec §4.4, §5 `InterruptAll`).
//!
//! Design Notes §9 calls for "a process-wide registry guarded by a mutex"
//! in place of the source's intrusive doubly-linked list, favouring a
//! concurrent container only if the interrupt path turns out to be
//! performance-sensitive (it is not: `InterruptAll` is a cold path fired at
//! most once per process, from a signal handler thread). A plain
//! `moth_sync::Monitor<HashMap<...>>` is enough.
//!
//! An isolate cannot be reached by `&mut Reactor` from another thread once
//! it has been submitted to the pool (spec §5: "only the owning isolate
//! thread touches it"), so cancellation is a shared flag each isolate polls
//! cooperatively (spec §4.2.4) rather than a cross-thread method call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use moth_mailbox::IsolateId;
use moth_sync::Monitor;
use tracing::debug;

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Monitor<HashMap<IsolateId, Arc<AtomicBool>>> {
    static REGISTRY: OnceLock<Monitor<HashMap<IsolateId, Arc<AtomicBool>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Monitor::new(HashMap::new()))
}

/// Allocate a fresh, process-unique isolate identity.
pub fn next_isolate_id() -> IsolateId {
    IsolateId::new(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Add `id` to the global list, returning the shared flag `interrupt_all`
/// sets. Mirrors the source linking a freshly-constructed `Isolate` onto
/// `Isolate::isolates_`.
pub(crate) fn register(id: IsolateId) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    registry().lock().insert(id, Arc::clone(&flag));
    flag
}

/// Remove `id` from the global list. Mirrors the source's `Unlink` on
/// isolate exit.
pub(crate) fn unregister(id: IsolateId) {
    registry().lock().remove(&id);
}

#[must_use]
pub(crate) fn is_registered(id: IsolateId) -> bool {
    registry().lock().contains_key(&id)
}

/// Spec §5 `InterruptAll`: walk the process-global isolate list and set
/// every isolate's interrupt flag. Each isolate observes its own flag on
/// the next opportunity (spec §4.2.4) and calls `Reactor::interrupt`
/// itself; nothing here touches another thread's heap or reactor.
pub fn interrupt_all() {
    let guard = registry().lock();
    debug!(count = guard.len(), "interrupting all isolates");
    for flag in guard.values() {
        flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn registered_isolates_are_interrupted_and_unknown_ones_are_unaffected() {
        let id = next_isolate_id();
        let flag = register(id);
        assert!(is_registered(id));
        assert!(!flag.load(Ordering::SeqCst));

        interrupt_all();
        assert!(flag.load(Ordering::SeqCst));

        unregister(id);
        assert!(!is_registered(id));
    }

    #[test]
    fn distinct_isolates_get_distinct_ids() {
        let a = next_isolate_id();
        let b = next_isolate_id();
        assert_ne!(a, b);
    }
}
