// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Class table (spec §4.1.6).
//!
//! Maps a [`ClassId`] to the heap reference of its class object. In
//! [`ClassTableMode::Strong`] every registered class is a GC root forever.
//! In [`ClassTableMode::Weak`] a class with no surviving instances after a
//! scavenge is mourned: its slot is cleared and recycled via a free list, so
//! its id can be reassigned to a later class (`ClassId::FREE_LIST_ELEMENT`
//! marks a mourned slot, per spec §3.3).

use crate::classid::ClassId;
use crate::config::ClassTableMode;
use crate::reference::Ref;

#[derive(Debug, Clone, Copy)]
struct Entry {
    class_object: Ref,
}

/// The class table.
#[derive(Debug)]
pub struct ClassTable {
    mode: ClassTableMode,
    entries: Vec<Option<Entry>>,
    free_list: Vec<u32>,
}

impl ClassTable {
    #[must_use]
    pub fn new(mode: ClassTableMode) -> Self {
        let mut entries = Vec::with_capacity(64);
        // Slots 0..USER_DEFINED_MIN are reserved by spec §3.3 and never
        // registered dynamically.
        entries.resize(ClassId::USER_DEFINED_MIN as usize, None);
        Self {
            mode,
            entries,
            free_list: Vec::new(),
        }
    }

    #[must_use]
    pub const fn mode(&self) -> ClassTableMode {
        self.mode
    }

    /// Register a new class, returning the id it was assigned. Reuses a
    /// mourned slot from the free list when one is available.
    pub fn register(&mut self, class_object: Ref) -> ClassId {
        if let Some(id) = self.free_list.pop() {
            self.entries[id as usize] = Some(Entry { class_object });
            return ClassId::new(id);
        }
        let id = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        self.entries.push(Some(Entry { class_object }));
        ClassId::new(id)
    }

    #[must_use]
    pub fn get(&self, id: ClassId) -> Option<Ref> {
        self.entries
            .get(id.as_u32() as usize)
            .and_then(|slot| slot.map(|entry| entry.class_object))
    }

    pub fn set(&mut self, id: ClassId, class_object: Ref) {
        if let Some(slot) = self.entries.get_mut(id.as_u32() as usize) {
            *slot = Some(Entry { class_object });
        }
    }

    /// Visit every registered class object so a scavenge can forward it.
    /// In strong mode this is exactly the GC root set contributed by the
    /// class table; in weak mode the scavenger calls this too, but treats
    /// survival (not mere presence) as the liveness signal via
    /// [`Self::mourn`] afterwards.
    pub fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Ref)) {
        if self.mode == ClassTableMode::Strong {
            for slot in &mut self.entries {
                if let Some(entry) = slot {
                    visitor(&mut entry.class_object);
                }
            }
        }
    }

    /// Weak-mode post-scavenge pass: `resolve` reports, for each entry's
    /// class object, either its new (forwarded) location if some other
    /// strong reference kept it alive, or `None` if it wasn't forwarded at
    /// all. A survivor's slot is updated to the forwarded address so
    /// [`Self::get`] never hands back a stale from-space corpse pointer; a
    /// non-survivor's slot is cleared and its id returned to the free list.
    pub fn mourn(&mut self, resolve: impl Fn(Ref) -> Option<Ref>) {
        if self.mode != ClassTableMode::Weak {
            return;
        }
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if let Some(entry) = slot {
                match resolve(entry.class_object) {
                    Some(relocated) => entry.class_object = relocated,
                    None => {
                        *slot = None;
                        self.free_list.push(u32::try_from(index).unwrap_or(u32::MAX));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::addr::Vaddr;

    #[test]
    fn register_assigns_ids_starting_after_reserved_range() {
        let mut table = ClassTable::new(ClassTableMode::Strong);
        let id = table.register(Ref::heap(Vaddr::new(16)));
        assert_eq!(id.as_u32(), ClassId::USER_DEFINED_MIN);
        assert_eq!(table.get(id), Some(Ref::heap(Vaddr::new(16))));
    }

    #[test]
    fn strong_mode_always_visits_every_entry() {
        let mut table = ClassTable::new(ClassTableMode::Strong);
        table.register(Ref::heap(Vaddr::new(16)));
        table.register(Ref::heap(Vaddr::new(32)));
        let mut visited = 0;
        table.visit_roots(&mut |_| visited += 1);
        assert_eq!(visited, 2);
    }

    #[test]
    fn weak_mode_mourns_dead_classes_and_recycles_their_id() {
        let mut table = ClassTable::new(ClassTableMode::Weak);
        let dead = table.register(Ref::heap(Vaddr::new(16)));
        let alive = table.register(Ref::heap(Vaddr::new(32)));
        // Simulates `alive`'s class object having been forwarded to a new
        // to-space address by some other strong reference, and `dead`'s
        // never having been forwarded at all.
        table.mourn(|r| (r == Ref::heap(Vaddr::new(32))).then(|| Ref::heap(Vaddr::new(128))));
        assert_eq!(table.get(dead), None);
        assert_eq!(table.get(alive), Some(Ref::heap(Vaddr::new(128))));

        let reused = table.register(Ref::heap(Vaddr::new(48)));
        assert_eq!(reused, dead);
    }

    #[test]
    fn weak_mode_does_not_visit_entries_as_roots() {
        let mut table = ClassTable::new(ClassTableMode::Weak);
        table.register(Ref::heap(Vaddr::new(16)));
        let mut visited = 0;
        table.visit_roots(&mut |_| visited += 1);
        assert_eq!(visited, 0);
    }
}
