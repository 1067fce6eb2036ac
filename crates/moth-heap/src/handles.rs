// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Handle scopes (spec §4.1.8).
//!
//! Handles give native code a way to hold a heap reference across an
//! operation that may trigger a scavenge, without that code having to
//! manually participate in root enumeration. Scopes nest in strict LIFO
//! order and are bounded to a depth of [`HandleScope::MAX_DEPTH`] — there is
//! no dynamic scope allocation, mirroring the stack-discipline handle areas
//! in `original_source/vm/handle.cc`.

use crate::error::HeapError;
use crate::reference::Ref;

/// A handle into a still-open [`HandleScope`]: stable across scavenges,
/// invalid once its owning scope (or an older one) has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    scope_depth: usize,
    slot: usize,
}

/// The LIFO stack of open handle scopes.
#[derive(Debug, Default)]
pub struct HandleScope {
    scopes: Vec<Vec<Ref>>,
}

impl HandleScope {
    /// Maximum number of nested scopes (spec §4.1.8).
    pub const MAX_DEPTH: usize = 8;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new, innermost scope.
    ///
    /// # Errors
    /// Returns [`HeapError::HandleScopeOverflow`] if the stack is already at
    /// [`Self::MAX_DEPTH`].
    pub fn open(&mut self) -> Result<(), HeapError> {
        if self.scopes.len() >= Self::MAX_DEPTH {
            return Err(HeapError::HandleScopeOverflow { max: Self::MAX_DEPTH });
        }
        self.scopes.push(Vec::new());
        Ok(())
    }

    /// Close the innermost scope, invalidating every handle created within
    /// it.
    ///
    /// # Errors
    /// Returns [`HeapError::NoHandleScope`] if no scope is open.
    pub fn close(&mut self) -> Result<(), HeapError> {
        self.scopes.pop().map(|_| ()).ok_or(HeapError::NoHandleScope)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Register `value` as a new handle in the innermost open scope.
    ///
    /// # Errors
    /// Returns [`HeapError::NoHandleScope`] if no scope is open.
    pub fn create(&mut self, value: Ref) -> Result<Handle, HeapError> {
        let depth = self.scopes.len();
        let scope = self.scopes.last_mut().ok_or(HeapError::NoHandleScope)?;
        let slot = scope.len();
        scope.push(value);
        Ok(Handle { scope_depth: depth - 1, slot })
    }

    /// Read the current value of `handle`.
    ///
    /// # Panics
    /// Panics if `handle`'s owning scope has since been closed; this is a
    /// programming error in the embedder, not a recoverable condition.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Ref {
        self.scopes
            .get(handle.scope_depth)
            .and_then(|scope| scope.get(handle.slot))
            .copied()
            .unwrap_or_else(|| panic!("handle references a closed scope"))
    }

    /// Overwrite the value behind `handle`, e.g. after a scavenge relocates
    /// the object it points to.
    ///
    /// # Panics
    /// Panics if `handle`'s owning scope has since been closed.
    pub fn set(&mut self, handle: Handle, value: Ref) {
        let slot = self
            .scopes
            .get_mut(handle.scope_depth)
            .and_then(|scope| scope.get_mut(handle.slot))
            .unwrap_or_else(|| panic!("handle references a closed scope"));
        *slot = value;
    }
}

impl crate::roots::RootSource for HandleScope {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Ref)) {
        for scope in &mut self.scopes {
            for slot in scope {
                visitor(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::addr::Vaddr;
    use crate::roots::RootSource;

    #[test]
    fn handles_round_trip_within_their_scope() {
        let mut handles = HandleScope::new();
        handles.open().expect("open");
        let h = handles.create(Ref::heap(Vaddr::new(16))).expect("create");
        assert_eq!(handles.get(h), Ref::heap(Vaddr::new(16)));
        handles.set(h, Ref::heap(Vaddr::new(32)));
        assert_eq!(handles.get(h), Ref::heap(Vaddr::new(32)));
    }

    #[test]
    fn scopes_nest_in_lifo_order() {
        let mut handles = HandleScope::new();
        handles.open().expect("open");
        let outer = handles.create(Ref::heap(Vaddr::new(16))).expect("create");
        handles.open().expect("open");
        let inner = handles.create(Ref::heap(Vaddr::new(32))).expect("create");
        assert_eq!(handles.depth(), 2);
        handles.close().expect("close");
        assert_eq!(handles.depth(), 1);
        assert_eq!(handles.get(outer), Ref::heap(Vaddr::new(16)));
        let _ = inner;
    }

    #[test]
    fn opening_past_max_depth_is_rejected() {
        let mut handles = HandleScope::new();
        for _ in 0..HandleScope::MAX_DEPTH {
            handles.open().expect("open");
        }
        assert!(matches!(handles.open(), Err(HeapError::HandleScopeOverflow { max: 8 })));
    }

    #[test]
    fn closing_with_no_open_scope_is_an_error() {
        let mut handles = HandleScope::new();
        assert!(matches!(handles.close(), Err(HeapError::NoHandleScope)));
    }

    #[test]
    fn visit_roots_reaches_every_live_handle() {
        let mut handles = HandleScope::new();
        handles.open().expect("open");
        handles.create(Ref::heap(Vaddr::new(16))).expect("create");
        handles.open().expect("open");
        handles.create(Ref::heap(Vaddr::new(32))).expect("create");
        let mut seen = 0;
        handles.visit_roots(&mut |_| seen += 1);
        assert_eq!(seen, 2);
    }
}
