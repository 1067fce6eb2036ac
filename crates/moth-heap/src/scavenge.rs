// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The scavenge itself: Cheney's copying algorithm, extended with an
//! ephemeron fixed-point pass (Hayes semantics) and weak-array mourning
//! (spec §4.1.3–§4.1.5).
//!
//! Objects are copied to to-space in the order roots are visited, then
//! to-space is scanned left to right; any new copies made while scanning
//! extend the region still to be scanned, so the scan pointer catching up
//! with the allocation pointer is the fixed point for ordinary (non-weak)
//! reachability. Ephemerons and weak arrays are not traced as part of that
//! pass — their fate is resolved afterwards.

use crate::addr::Vaddr;
use crate::alloc::{ELEMENTS_OR_VALUE_OFFSET, EPHEMERON_FINALIZER_OFFSET, LENGTH_OR_KEY_OFFSET};
use crate::classid::ClassId;
use crate::classtable::ClassTable;
use crate::handles::HandleScope;
use crate::header::{ALIGN_WORDS, Header};
use crate::reference::Ref;
use crate::roots::RootSource;
use crate::space::Semispace;

const WORD_BYTES: u64 = 8;

/// Counters from one scavenge, surfaced for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScavengeStats {
    pub objects_copied: u64,
    pub words_copied: u64,
    pub ephemerons_mourned: u64,
    pub weak_array_slots_mourned: u64,
}

fn in_space(addr: Vaddr, space: &Semispace) -> bool {
    let base = space.base();
    addr >= base && addr.diff(base) < space.capacity_words() * WORD_BYTES
}

fn is_forwarded(r: Ref, from: &Semispace) -> Option<Vaddr> {
    let addr = r.heap_addr()?;
    if !in_space(addr, from) {
        return None;
    }
    let header = Header::from_word(from.read_word(addr));
    header
        .is_forwarding_corpse()
        .then(|| Vaddr::new(from.read_word(addr.add(WORD_BYTES))))
}

struct Copier<'a> {
    from: &'a mut Semispace,
    to: &'a mut Semispace,
    ephemerons: Vec<Vaddr>,
    weak_arrays: Vec<Vaddr>,
    stats: ScavengeStats,
}

impl Copier<'_> {
    /// Forward a single reference: copy its referent to to-space (if it
    /// hasn't been already) and return the updated reference.
    fn forward(&mut self, r: Ref) -> Ref {
        let Some(addr) = r.heap_addr() else {
            return r;
        };
        if !in_space(addr, self.from) {
            // Outside the managed semispace: a permanent/immutable object
            // that this collector doesn't relocate.
            return r;
        }
        let header = Header::from_word(self.from.read_word(addr));
        if header.is_forwarding_corpse() {
            let target = self.from.read_word(addr.add(WORD_BYTES));
            return Ref::heap(Vaddr::new(target));
        }
        let total_words = header
            .size_words_from_tag()
            .expect("overflow-sized objects are not supported without an overflow word");
        let new_addr = self
            .to
            .bump(total_words)
            .expect("to-space exhausted mid-scavenge: grow before calling scavenge");
        for index in 0..total_words {
            let offset = index * WORD_BYTES;
            let word = self.from.read_word(addr.add(offset));
            self.to.write_word(new_addr.add(offset), word);
        }
        self.from
            .write_word(addr, header.with_class_id(ClassId::FORWARDING_CORPSE).as_word());
        self.from.write_word(addr.add(WORD_BYTES), new_addr.as_u64());

        self.stats.objects_copied += 1;
        self.stats.words_copied += total_words;

        let class_id = header.class_id();
        if class_id == ClassId::EPHEMERON {
            self.ephemerons.push(new_addr);
        } else if class_id == ClassId::WEAK_ARRAY {
            self.weak_arrays.push(new_addr);
        }
        Ref::heap(new_addr)
    }

    /// Scan one already-copied object in to-space, forwarding its strong
    /// ref slots. Returns the address immediately after it.
    fn scan_one(&mut self, addr: Vaddr) -> Vaddr {
        let header = Header::from_word(self.to.read_word(addr));
        let total_words = header
            .size_words_from_tag()
            .expect("to-space objects always carry a recoverable size tag");
        let class_id = header.class_id();

        let is_length_prefixed_refs =
            class_id == ClassId::ARRAY || class_id == ClassId::CLOSURE || class_id == ClassId::ACTIVATION || class_id.is_user_defined();

        if is_length_prefixed_refs {
            let length = self.to.read_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES));
            for index in 0..length {
                let slot = addr.add((ELEMENTS_OR_VALUE_OFFSET + index) * WORD_BYTES);
                let r = Ref::from_word(self.to.read_word(slot));
                let forwarded = self.forward(r);
                self.to.write_word(slot, forwarded.as_word());
            }
        }
        // WEAK_ARRAY and EPHEMERON slots are deliberately left unscanned
        // here; they were queued by `forward` and are resolved afterwards.
        // Byte arrays/strings/wide strings/medium ints/float64 carry no
        // ref slots at all.

        addr.add(total_words * WORD_BYTES)
    }

    fn drive_to_fixed_point(&mut self, scan_start: Vaddr) {
        let mut scan = scan_start;
        loop {
            while scan < self.to.top() {
                scan = self.scan_one(scan);
            }
            if self.ephemerons.is_empty() {
                break;
            }
            let pending = std::mem::take(&mut self.ephemerons);
            let mut progressed = false;
            for eph_addr in pending {
                let key_slot = eph_addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES);
                let key = Ref::from_word(self.to.read_word(key_slot));
                let key_alive = key
                    .heap_addr()
                    .map(|a| !in_space(a, self.from) || is_forwarded(key, self.from).is_some())
                    .unwrap_or(true);
                if key_alive {
                    let new_key = self.forward(key);
                    self.to.write_word(key_slot, new_key.as_word());
                    let value_slot = eph_addr.add(ELEMENTS_OR_VALUE_OFFSET * WORD_BYTES);
                    let value = Ref::from_word(self.to.read_word(value_slot));
                    let new_value = self.forward(value);
                    self.to.write_word(value_slot, new_value.as_word());
                    let finalizer_slot = eph_addr.add(EPHEMERON_FINALIZER_OFFSET * WORD_BYTES);
                    let finalizer = Ref::from_word(self.to.read_word(finalizer_slot));
                    let new_finalizer = self.forward(finalizer);
                    self.to.write_word(finalizer_slot, new_finalizer.as_word());
                    progressed = true;
                } else {
                    self.ephemerons.push(eph_addr);
                }
            }
            if !progressed {
                break;
            }
        }

        // Anything still pending has an unreachable key: mourn all three
        // slots (spec §3.4, P4) rather than just key/value.
        for eph_addr in self.ephemerons.drain(..) {
            let nil = Ref::small_int(0).unwrap_or_else(|| unreachable!("0 is always representable"));
            self.to.write_word(eph_addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), nil.as_word());
            self.to.write_word(eph_addr.add(ELEMENTS_OR_VALUE_OFFSET * WORD_BYTES), nil.as_word());
            self.to.write_word(eph_addr.add(EPHEMERON_FINALIZER_OFFSET * WORD_BYTES), nil.as_word());
            self.stats.ephemerons_mourned += 1;
        }
    }

    fn mourn_weak_arrays(&mut self) {
        let weak_arrays = std::mem::take(&mut self.weak_arrays);
        for wa_addr in weak_arrays {
            let length = self.to.read_word(wa_addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES));
            for index in 0..length {
                let slot = wa_addr.add((ELEMENTS_OR_VALUE_OFFSET + index) * WORD_BYTES);
                let r = Ref::from_word(self.to.read_word(slot));
                // An immediate (small int, etc.) has no heap target and is
                // never mourned, matching the ephemeron key check above.
                let resolved = match r.heap_addr() {
                    None => Some(r),
                    Some(a) => {
                        if in_space(a, self.from) {
                            is_forwarded(r, self.from).map(Ref::heap)
                        } else {
                            Some(r)
                        }
                    }
                };
                match resolved {
                    Some(alive) => self.to.write_word(slot, alive.as_word()),
                    None => {
                        let nil = Ref::small_int(0).unwrap_or_else(|| unreachable!("0 is always representable"));
                        self.to.write_word(slot, nil.as_word());
                        self.stats.weak_array_slots_mourned += 1;
                    }
                }
            }
        }
    }
}

/// Run one full scavenge: flip from `from` into `to`, tracing `roots`,
/// `handles`, and `class_table`, then resolve ephemerons and weak arrays.
///
/// `to` must already be empty (freshly reset or freshly grown); `from`
/// holds the previous generation's live set plus garbage.
pub fn scavenge(
    from: &mut Semispace,
    to: &mut Semispace,
    class_table: &mut ClassTable,
    roots: &mut dyn RootSource,
    handles: &mut HandleScope,
) -> ScavengeStats {
    to.reset();
    let scan_start = to.top();

    let mut copier = Copier {
        from,
        to,
        ephemerons: Vec::new(),
        weak_arrays: Vec::new(),
        stats: ScavengeStats::default(),
    };

    {
        let copier = &mut copier;
        roots.visit_roots(&mut |r| *r = copier.forward(*r));
    }
    {
        let copier = &mut copier;
        handles.visit_roots(&mut |r| *r = copier.forward(*r));
    }
    {
        let copier = &mut copier;
        class_table.visit_roots(&mut |r| *r = copier.forward(*r));
    }

    copier.drive_to_fixed_point(scan_start);
    copier.mourn_weak_arrays();

    let from = &*copier.from;
    class_table.mourn(|r| match r.heap_addr() {
        None => Some(r),
        Some(a) if !in_space(a, from) => Some(r),
        Some(_) => is_forwarded(r, from).map(Ref::heap),
    });

    copier.stats
}

const _: () = assert!(ALIGN_WORDS == 2, "scavenge assumes 2-word alignment throughout");

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::alloc::{alloc_ephemeron, alloc_refs, read_refs};
    use crate::classid::ClassId;
    use crate::config::ClassTableMode;

    #[test]
    fn live_array_survives_a_scavenge_and_is_relocated() {
        let mut from = Semispace::new(128).expect("map");
        let mut to = Semispace::new(128).expect("map");
        let mut class_table = ClassTable::new(ClassTableMode::Strong);
        let mut handles = HandleScope::new();

        let elements = vec![Ref::small_int(42).unwrap()];
        let array = alloc_refs(&mut from, ClassId::ARRAY, &elements, 1).expect("room");
        let mut roots = vec![array];

        let stats = scavenge(&mut from, &mut to, &mut class_table, &mut roots, &mut handles);
        assert_eq!(stats.objects_copied, 1);

        let new_addr = roots[0].heap_addr().expect("heap ref");
        assert_ne!(new_addr, array.heap_addr().unwrap());
        assert_eq!(read_refs(&to, new_addr), elements);
    }

    #[test]
    fn garbage_is_not_copied() {
        let mut from = Semispace::new(128).expect("map");
        let mut to = Semispace::new(128).expect("map");
        let mut class_table = ClassTable::new(ClassTableMode::Strong);
        let mut handles = HandleScope::new();

        alloc_refs(&mut from, ClassId::ARRAY, &[Ref::small_int(1).unwrap()], 1).expect("room");
        let mut roots: Vec<Ref> = Vec::new();

        let stats = scavenge(&mut from, &mut to, &mut class_table, &mut roots, &mut handles);
        assert_eq!(stats.objects_copied, 0);
    }

    #[test]
    fn ephemeron_with_unreachable_key_is_mourned() {
        let mut from = Semispace::new(256).expect("map");
        let mut to = Semispace::new(256).expect("map");
        let mut class_table = ClassTable::new(ClassTableMode::Strong);
        let mut handles = HandleScope::new();

        let key = alloc_refs(&mut from, ClassId::new(20), &[], 1).expect("room");
        let value = alloc_refs(&mut from, ClassId::new(20), &[], 2).expect("room");
        let finalizer = alloc_refs(&mut from, ClassId::new(20), &[], 4).expect("room");
        let ephemeron = alloc_ephemeron(&mut from, key, value, finalizer, 3).expect("room");
        // Only the ephemeron itself is rooted; its key/value/finalizer are not.
        let mut roots = vec![ephemeron];

        let stats = scavenge(&mut from, &mut to, &mut class_table, &mut roots, &mut handles);
        assert_eq!(stats.ephemerons_mourned, 1);

        let eph_addr = roots[0].heap_addr().expect("heap ref");
        let key_word = to.read_word(eph_addr.add(16));
        assert_eq!(Ref::from_word(key_word), Ref::small_int(0).unwrap());
        let value_word = to.read_word(eph_addr.add(24));
        assert_eq!(Ref::from_word(value_word), Ref::small_int(0).unwrap());
        let finalizer_word = to.read_word(eph_addr.add(32));
        assert_eq!(Ref::from_word(finalizer_word), Ref::small_int(0).unwrap());
    }

    #[test]
    fn ephemeron_with_reachable_key_keeps_its_value() {
        let mut from = Semispace::new(256).expect("map");
        let mut to = Semispace::new(256).expect("map");
        let mut class_table = ClassTable::new(ClassTableMode::Strong);
        let mut handles = HandleScope::new();

        let key = alloc_refs(&mut from, ClassId::new(20), &[], 1).expect("room");
        let value = alloc_refs(&mut from, ClassId::new(20), &[Ref::small_int(99).unwrap()], 2)
            .expect("room");
        let finalizer = alloc_refs(&mut from, ClassId::new(20), &[Ref::small_int(7).unwrap()], 4)
            .expect("room");
        let ephemeron = alloc_ephemeron(&mut from, key, value, finalizer, 3).expect("room");
        // Both the ephemeron and its key are reachable through other roots.
        let mut roots = vec![ephemeron, key];

        let stats = scavenge(&mut from, &mut to, &mut class_table, &mut roots, &mut handles);
        assert_eq!(stats.ephemerons_mourned, 0);

        let eph_addr = roots[0].heap_addr().expect("heap ref");
        let value_ref = Ref::from_word(to.read_word(eph_addr.add(24)));
        let value_addr = value_ref.heap_addr().expect("heap ref");
        assert_eq!(read_refs(&to, value_addr), vec![Ref::small_int(99).unwrap()]);

        let finalizer_ref = Ref::from_word(to.read_word(eph_addr.add(32)));
        let finalizer_addr = finalizer_ref.heap_addr().expect("heap ref");
        assert_eq!(read_refs(&to, finalizer_addr), vec![Ref::small_int(7).unwrap()]);
    }

    #[test]
    fn weak_array_slot_to_unreachable_object_is_niled_out() {
        let mut from = Semispace::new(256).expect("map");
        let mut to = Semispace::new(256).expect("map");
        let mut class_table = ClassTable::new(ClassTableMode::Strong);
        let mut handles = HandleScope::new();

        let garbage = alloc_refs(&mut from, ClassId::new(20), &[], 1).expect("room");
        let survivor = alloc_refs(&mut from, ClassId::new(20), &[], 2).expect("room");
        let weak =
            alloc_refs(&mut from, ClassId::WEAK_ARRAY, &[garbage, survivor], 3).expect("room");
        let mut roots = vec![weak, survivor];

        scavenge(&mut from, &mut to, &mut class_table, &mut roots, &mut handles);

        let weak_addr = roots[0].heap_addr().expect("heap ref");
        let slots = read_refs(&to, weak_addr);
        assert_eq!(slots[0], Ref::small_int(0).unwrap());
        assert_ne!(slots[1], Ref::small_int(0).unwrap());
    }
}
