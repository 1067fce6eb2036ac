// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! `become:` — identity swap (spec §4.1.7).
//!
//! Every existing reference to object A must, after `become(a, b)`, see
//! what used to be at B, and vice versa. We get this for free by swapping
//! the two objects' header, hash, and payload words in place: the
//! addresses (and therefore every tagged `Ref` anywhere that already points
//! at them) never change, only what's stored there does.
//!
//! This requires the two objects to occupy the same number of words;
//! mismatched sizes are rejected rather than handled via indirection
//! forwarding, since nothing in this implementation ever needs to recover
//! an object's original size from a corpse after the fact (see
//! [`crate::header`] module docs on the omitted overflow word).

use std::collections::HashSet;

use crate::addr::Vaddr;
use crate::error::HeapError;
use crate::header::Header;
use crate::reference::Ref;
use crate::space::Semispace;

const WORD_BYTES: u64 = 8;

/// Swap the identities of two heap objects in place.
///
/// # Errors
/// - [`HeapError::BecomeNotHeapRef`] if either argument is a small integer.
/// - [`HeapError::BecomeSizeMismatch`] if the two objects have different
///   total word sizes.
pub fn become_one(space: &mut Semispace, left: Ref, right: Ref) -> Result<(), HeapError> {
    let left_addr = left
        .heap_addr()
        .ok_or(HeapError::BecomeNotHeapRef { index: 0, addr: Vaddr::default() })?;
    let right_addr = right
        .heap_addr()
        .ok_or(HeapError::BecomeNotHeapRef { index: 1, addr: Vaddr::default() })?;

    let left_header = Header::from_word(space.read_word(left_addr));
    let right_header = Header::from_word(space.read_word(right_addr));
    let left_words = left_header
        .size_words_from_tag()
        .expect("become: operand without a recoverable size tag");
    let right_words = right_header
        .size_words_from_tag()
        .expect("become: operand without a recoverable size tag");
    if left_words != right_words {
        return Err(HeapError::BecomeSizeMismatch {
            left: left_addr,
            right: right_addr,
            left_words,
            right_words,
        });
    }

    for index in 0..left_words {
        let offset = index * WORD_BYTES;
        let left_word = space.read_word(left_addr.add(offset));
        let right_word = space.read_word(right_addr.add(offset));
        space.write_word(left_addr.add(offset), right_word);
        space.write_word(right_addr.add(offset), left_word);
    }
    Ok(())
}

/// Swap identities pairwise across two equal-length arrays of references
/// (the batched form of `become:`, spec §4.1.7).
///
/// # Errors
/// Returns [`HeapError::BecomeLengthMismatch`] if the two slices differ in
/// length, [`HeapError::BecomeNotDistinct`] if `lefts` and `rights` combined
/// contain a repeated reference, or any error [`become_one`] would return
/// for a given pair.
pub fn become_many(space: &mut Semispace, lefts: &[Ref], rights: &[Ref]) -> Result<(), HeapError> {
    if lefts.len() != rights.len() {
        return Err(HeapError::BecomeLengthMismatch {
            left: lefts.len(),
            right: rights.len(),
        });
    }

    // Every element across both arrays must be pairwise distinct: a repeat
    // would make two become_one calls swap the same address twice, leaving
    // its contents undefined (spec §4.1.7 step 1).
    let mut seen = HashSet::with_capacity(lefts.len() + rights.len());
    if !lefts.iter().chain(rights.iter()).all(|r| seen.insert(*r)) {
        return Err(HeapError::BecomeNotDistinct);
    }

    for (&left, &right) in lefts.iter().zip(rights.iter()) {
        become_one(space, left, right)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::alloc::{alloc_refs, read_refs};
    use crate::classid::ClassId;

    #[test]
    fn become_swaps_contents_but_not_addresses() {
        let mut space = Semispace::new(128).expect("map");
        let a = alloc_refs(&mut space, ClassId::ARRAY, &[Ref::small_int(1).unwrap()], 1)
            .expect("room");
        let b = alloc_refs(&mut space, ClassId::ARRAY, &[Ref::small_int(2).unwrap()], 2)
            .expect("room");
        let a_addr = a.heap_addr().unwrap();
        let b_addr = b.heap_addr().unwrap();

        become_one(&mut space, a, b).expect("become");

        assert_eq!(read_refs(&space, a_addr), vec![Ref::small_int(2).unwrap()]);
        assert_eq!(read_refs(&space, b_addr), vec![Ref::small_int(1).unwrap()]);
    }

    #[test]
    fn become_rejects_small_ints() {
        let mut space = Semispace::new(128).expect("map");
        let a = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        let small = Ref::small_int(5).unwrap();
        assert!(matches!(
            become_one(&mut space, a, small),
            Err(HeapError::BecomeNotHeapRef { index: 1, .. })
        ));
    }

    #[test]
    fn become_rejects_mismatched_sizes() {
        let mut space = Semispace::new(128).expect("map");
        let a = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        let b = alloc_refs(
            &mut space,
            ClassId::ARRAY,
            &[Ref::small_int(1).unwrap(), Ref::small_int(2).unwrap()],
            2,
        )
        .expect("room");
        assert!(matches!(
            become_one(&mut space, a, b),
            Err(HeapError::BecomeSizeMismatch { .. })
        ));
    }

    #[test]
    fn become_many_rejects_length_mismatch() {
        let mut space = Semispace::new(128).expect("map");
        let a = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        assert!(matches!(
            become_many(&mut space, &[a], &[]),
            Err(HeapError::BecomeLengthMismatch { left: 1, right: 0 })
        ));
    }

    #[test]
    fn become_many_rejects_repeated_elements() {
        let mut space = Semispace::new(128).expect("map");
        let a = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        assert!(matches!(
            become_many(&mut space, &[a], &[a]),
            Err(HeapError::BecomeNotDistinct)
        ));
    }

    #[test]
    fn become_many_accepts_disjoint_pairs() {
        let mut space = Semispace::new(128).expect("map");
        let a = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        let b = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        let c = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        let d = alloc_refs(&mut space, ClassId::ARRAY, &[], 1).expect("room");
        assert!(become_many(&mut space, &[a, b], &[c, d]).is_ok());
    }
}
