// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The top-level managed heap: two semispaces, a class table, and the
//! handle stack, wired together behind the allocation and collection API an
//! isolate actually calls (spec §4.1).

use moth_random::Random;
use tracing::{debug, info, instrument};

use crate::alloc;
use crate::become_;
use crate::classid::ClassId;
use crate::classtable::ClassTable;
use crate::config::HeapConfig;
use crate::error::HeapError;
use crate::handles::{Handle, HandleScope};
use crate::reference::Ref;
use crate::roots::RootSource;
use crate::space::Semispace;

/// The managed heap for one isolate.
pub struct Heap {
    active: Semispace,
    inactive: Semispace,
    class_table: ClassTable,
    handles: HandleScope,
    random: Random,
    config: HeapConfig,
}

impl Heap {
    /// Map both semispaces and start with an empty class table and handle
    /// stack.
    ///
    /// # Errors
    /// Returns [`HeapError::Platform`] if either semispace's underlying
    /// mapping fails.
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        let active = Semispace::new(config.initial_semispace_words)?;
        let inactive = Semispace::new(config.initial_semispace_words)?;
        Ok(Self {
            active,
            inactive,
            class_table: ClassTable::new(config.class_table_mode),
            handles: HandleScope::new(),
            random: Random::from_entropy(),
            config,
        })
    }

    #[must_use]
    pub fn used_words(&self) -> u64 {
        self.active.used_words()
    }

    #[must_use]
    pub fn capacity_words(&self) -> u64 {
        self.active.capacity_words()
    }

    #[must_use]
    pub const fn class_table(&self) -> &ClassTable {
        &self.class_table
    }

    pub fn register_class(&mut self, class_object: Ref) -> ClassId {
        self.class_table.register(class_object)
    }

    /// Open a new handle scope.
    ///
    /// # Errors
    /// Returns [`HeapError::HandleScopeOverflow`] past the nesting limit.
    pub fn open_handle_scope(&mut self) -> Result<(), HeapError> {
        self.handles.open()
    }

    /// Close the innermost handle scope.
    ///
    /// # Errors
    /// Returns [`HeapError::NoHandleScope`] if none is open.
    pub fn close_handle_scope(&mut self) -> Result<(), HeapError> {
        self.handles.close()
    }

    /// Register `value` as a handle in the innermost open scope.
    ///
    /// # Errors
    /// Returns [`HeapError::NoHandleScope`] if none is open.
    pub fn create_handle(&mut self, value: Ref) -> Result<Handle, HeapError> {
        self.handles.create(value)
    }

    #[must_use]
    pub fn handle(&self, handle: Handle) -> Ref {
        self.handles.get(handle)
    }

    fn next_identity_hash(&mut self) -> u32 {
        self.random.next_identity_hash()
    }

    /// Allocate space for the given number of total words, scavenging (and
    /// growing, if still not enough room) as needed.
    ///
    /// `roots` supplies the embedder's external roots, traced alongside the
    /// handle stack and class table on every scavenge this call triggers.
    fn ensure_room(&mut self, words: u64, roots: &mut dyn RootSource) -> Result<(), HeapError> {
        if self.active.free_words() >= words {
            return Ok(());
        }
        self.scavenge(roots);
        if self.active.free_words() >= words {
            return Ok(());
        }
        self.grow(words, roots)?;
        if self.active.free_words() >= words {
            return Ok(());
        }
        Err(HeapError::OutOfMemory {
            requested_words: words,
            space_words: self.active.capacity_words(),
        })
    }

    /// Run one scavenge now, tracing `roots` in addition to the handle
    /// stack and class table.
    #[instrument(skip_all, fields(used_words = self.active.used_words()))]
    pub fn scavenge(&mut self, roots: &mut dyn RootSource) -> crate::scavenge::ScavengeStats {
        let stats = crate::scavenge::scavenge(
            &mut self.active,
            &mut self.inactive,
            &mut self.class_table,
            roots,
            &mut self.handles,
        );
        std::mem::swap(&mut self.active, &mut self.inactive);
        debug!(?stats, "scavenge complete");
        stats
    }

    /// Double each semispace's capacity and re-run a scavenge into the
    /// larger space (spec §4.1.4 step 6). Bounded by
    /// [`HeapConfig::max_semispace_words`].
    fn grow(&mut self, needed_words: u64, roots: &mut dyn RootSource) -> Result<(), HeapError> {
        let current = self.active.capacity_words();
        let target = current
            .saturating_mul(2)
            .max(current + needed_words)
            .min(self.config.max_semispace_words);
        if target <= current {
            return Ok(());
        }
        info!(from_words = current, to_words = target, "growing heap");
        // Both semispaces must end up at `target`: the scavenge below
        // copies `active` into the freshly enlarged `inactive`, then a
        // later ordinary scavenge copies back the other way, which would
        // panic mid-copy (`to` too small) if `active` were left behind at
        // its old, smaller capacity.
        self.inactive = Semispace::new(target)?;
        self.scavenge(roots);
        self.inactive = Semispace::new(target)?;
        Ok(())
    }

    pub fn alloc_array(
        &mut self,
        elements: &[Ref],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        self.alloc_refs(ClassId::ARRAY, elements, roots)
    }

    pub fn alloc_weak_array(
        &mut self,
        elements: &[Ref],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        self.alloc_refs(ClassId::WEAK_ARRAY, elements, roots)
    }

    pub fn alloc_instance(
        &mut self,
        class_id: ClassId,
        fields: &[Ref],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        self.alloc_refs(class_id, fields, roots)
    }

    fn alloc_refs(
        &mut self,
        class_id: ClassId,
        refs: &[Ref],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        let words = alloc::HEADER_WORDS + 1 + refs.len() as u64;
        self.ensure_room(words, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_refs(&mut self.active, class_id, refs, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    pub fn alloc_closure(
        &mut self,
        method: Ref,
        captures: &[Ref],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        let words = alloc::HEADER_WORDS + 2 + captures.len() as u64;
        self.ensure_room(words, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_closure(&mut self.active, method, captures, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    pub fn alloc_activation(
        &mut self,
        method: Ref,
        receiver: Ref,
        locals: &[Ref],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        let words = alloc::HEADER_WORDS + 3 + locals.len() as u64;
        self.ensure_room(words, roots)?;
        let hash = self.next_identity_hash();
        Ok(
            alloc::alloc_activation(&mut self.active, method, receiver, locals, hash)
                .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")),
        )
    }

    pub fn alloc_ephemeron(
        &mut self,
        key: Ref,
        value: Ref,
        finalizer: Ref,
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        self.ensure_room(alloc::HEADER_WORDS + 3, roots)?;
        let hash = self.next_identity_hash();
        Ok(
            alloc::alloc_ephemeron(&mut self.active, key, value, finalizer, hash)
                .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")),
        )
    }

    pub fn alloc_byte_array(
        &mut self,
        bytes: &[u8],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        let words = alloc::HEADER_WORDS + 1 + bytes.len().div_ceil(8) as u64;
        self.ensure_room(words, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_byte_array(&mut self.active, bytes, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    pub fn alloc_byte_string(
        &mut self,
        bytes: &[u8],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        let words = alloc::HEADER_WORDS + 1 + bytes.len().div_ceil(8) as u64;
        self.ensure_room(words, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_byte_string(&mut self.active, bytes, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    pub fn alloc_wide_string(
        &mut self,
        codepoints: &[u32],
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        let words = alloc::HEADER_WORDS + 1 + (codepoints.len() * 4).div_ceil(8) as u64;
        self.ensure_room(words, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_wide_string(&mut self.active, codepoints, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    pub fn alloc_medium_int(
        &mut self,
        value: i64,
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        self.ensure_room(alloc::HEADER_WORDS + 1, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_medium_int(&mut self.active, value, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    pub fn alloc_float64(
        &mut self,
        value: f64,
        roots: &mut dyn RootSource,
    ) -> Result<Ref, HeapError> {
        self.ensure_room(alloc::HEADER_WORDS + 1, roots)?;
        let hash = self.next_identity_hash();
        Ok(alloc::alloc_float64(&mut self.active, value, hash)
            .unwrap_or_else(|| unreachable!("ensure_room guaranteed capacity")))
    }

    #[must_use]
    pub fn read_refs(&self, r: Ref) -> Vec<Ref> {
        let addr = r.heap_addr().expect("read_refs called on a non-heap reference");
        alloc::read_refs(&self.active, addr)
    }

    #[must_use]
    pub fn read_bytes(&self, r: Ref) -> Vec<u8> {
        let addr = r.heap_addr().expect("read_bytes called on a non-heap reference");
        alloc::read_bytes(&self.active, addr)
    }

    #[must_use]
    pub fn read_medium_int(&self, r: Ref) -> i64 {
        let addr = r.heap_addr().expect("read_medium_int called on a non-heap reference");
        alloc::read_medium_int(&self.active, addr)
    }

    #[must_use]
    pub fn read_float64(&self, r: Ref) -> f64 {
        let addr = r.heap_addr().expect("read_float64 called on a non-heap reference");
        alloc::read_float64(&self.active, addr)
    }

    /// Patch a single element slot of an already-allocated array, weak
    /// array, instance, closure, or activation. Used by the snapshot
    /// deserializer's edge pass, where an object's slots may reference
    /// others materialized later in the same pass (spec §6.2).
    pub fn write_ref_at(&mut self, r: Ref, index: u64, value: Ref) {
        let addr = r.heap_addr().expect("write_ref_at called on a non-heap reference");
        alloc::write_ref_at(&mut self.active, addr, index, value);
    }

    /// Swap the identities of two heap objects of equal size.
    ///
    /// # Errors
    /// See [`become_::become_one`].
    pub fn become_one(&mut self, left: Ref, right: Ref) -> Result<(), HeapError> {
        become_::become_one(&mut self.active, left, right)
    }

    /// Swap identities pairwise across two equal-length reference arrays.
    ///
    /// # Errors
    /// See [`become_::become_many`].
    pub fn become_many(&mut self, lefts: &[Ref], rights: &[Ref]) -> Result<(), HeapError> {
        become_::become_many(&mut self.active, lefts, rights)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::ClassTableMode;

    fn small_config() -> HeapConfig {
        HeapConfig {
            initial_semispace_words: 64,
            max_semispace_words: 4096,
            class_table_mode: ClassTableMode::Strong,
        }
    }

    #[test]
    fn allocate_and_read_back_an_array() {
        let mut heap = Heap::new(small_config()).expect("map");
        let mut roots: Vec<Ref> = Vec::new();
        let elements = vec![Ref::small_int(1).unwrap(), Ref::small_int(2).unwrap()];
        let array = heap.alloc_array(&elements, &mut roots).expect("alloc");
        assert_eq!(heap.read_refs(array), elements);
    }

    #[test]
    fn scavenge_preserves_rooted_objects_across_many_allocations() {
        let mut heap = Heap::new(small_config()).expect("map");
        let survivor = heap
            .alloc_array(&[Ref::small_int(7).unwrap()], &mut Vec::new())
            .expect("alloc");
        let mut roots = vec![survivor];
        for i in 0..50 {
            heap.alloc_array(&[Ref::small_int(i).unwrap()], &mut roots)
                .expect("alloc should trigger scavenges as needed, not fail");
        }
        assert_eq!(
            heap.read_refs(roots[0]),
            vec![Ref::small_int(7).unwrap()]
        );
    }

    #[test]
    fn become_is_visible_through_an_existing_handle() {
        let mut heap = Heap::new(small_config()).expect("map");
        let mut roots: Vec<Ref> = Vec::new();
        let a = heap.alloc_array(&[Ref::small_int(1).unwrap()], &mut roots).expect("alloc");
        let b = heap.alloc_array(&[Ref::small_int(2).unwrap()], &mut roots).expect("alloc");
        heap.become_one(a, b).expect("become");
        assert_eq!(heap.read_refs(a), vec![Ref::small_int(2).unwrap()]);
        assert_eq!(heap.read_refs(b), vec![Ref::small_int(1).unwrap()]);
    }

    #[test]
    fn handle_scopes_nest_and_reject_depth_overflow() {
        let mut heap = Heap::new(small_config()).expect("map");
        for _ in 0..HandleScope::MAX_DEPTH {
            heap.open_handle_scope().expect("open");
        }
        assert!(heap.open_handle_scope().is_err());
    }
}
