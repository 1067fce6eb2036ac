// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-shape allocation (spec §4.1.2).
//!
//! Every object is `header | hash | payload`. Variable-arity shapes (arrays,
//! weak arrays, user-defined instances, closures, activations) additionally
//! store an explicit element-count word right after the hash, at a fixed
//! offset, so the GC can recover their ref-slot range without consulting a
//! per-class instance-variable schema we don't otherwise track. Fixed-arity
//! shapes (ephemerons, medium integers, float64) don't need it.

use crate::addr::Vaddr;
use crate::classid::ClassId;
use crate::header::{ALIGN_WORDS, Header};
use crate::reference::Ref;
use crate::space::Semispace;

/// Words occupied by the header and identity-hash.
pub const HEADER_WORDS: u64 = 2;
/// Word offset (from the header) of the length word in length-prefixed
/// shapes, and of the key slot in an ephemeron.
pub const LENGTH_OR_KEY_OFFSET: u64 = HEADER_WORDS;
/// Word offset of the first element in length-prefixed shapes, and of the
/// value slot in an ephemeron.
pub const ELEMENTS_OR_VALUE_OFFSET: u64 = HEADER_WORDS + 1;
/// Word offset of an ephemeron's finalizer slot (spec §3.4: an ephemeron is
/// the triple `(key, value, finalizer)`).
pub const EPHEMERON_FINALIZER_OFFSET: u64 = HEADER_WORDS + 2;

const WORD_BYTES: u64 = 8;

fn words_for_bytes(len: usize) -> u64 {
    (len as u64).div_ceil(WORD_BYTES)
}

fn alloc_header_and_hash(
    space: &mut Semispace,
    class_id: ClassId,
    total_words: u64,
    identity_hash: u32,
) -> Option<Vaddr> {
    let total_words = total_words.next_multiple_of(ALIGN_WORDS);
    let addr = space.bump(total_words)?;
    space.write_word(addr, Header::new(class_id, total_words).as_word());
    space.write_word(addr.add(WORD_BYTES), u64::from(identity_hash));
    Some(addr)
}

/// Allocate a length-prefixed, all-`Ref` object: arrays, weak arrays, and
/// user-defined instances (whose instance variables we model as all being
/// `Ref`-valued, since we don't track a per-class field schema).
#[must_use]
pub fn alloc_refs(
    space: &mut Semispace,
    class_id: ClassId,
    refs: &[Ref],
    identity_hash: u32,
) -> Option<Ref> {
    let total_words = HEADER_WORDS + 1 + refs.len() as u64;
    let addr = alloc_header_and_hash(space, class_id, total_words, identity_hash)?;
    space.write_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), refs.len() as u64);
    for (index, r) in refs.iter().enumerate() {
        let offset = (ELEMENTS_OR_VALUE_OFFSET + index as u64) * WORD_BYTES;
        space.write_word(addr.add(offset), r.as_word());
    }
    Some(Ref::heap(addr))
}

/// Allocate a closure: `refs[0]` is the method reference, the rest are
/// captured variables.
#[must_use]
pub fn alloc_closure(
    space: &mut Semispace,
    method: Ref,
    captures: &[Ref],
    identity_hash: u32,
) -> Option<Ref> {
    let mut refs = Vec::with_capacity(1 + captures.len());
    refs.push(method);
    refs.extend_from_slice(captures);
    alloc_refs(space, ClassId::CLOSURE, &refs, identity_hash)
}

/// Allocate an activation record: `refs[0]` is the method, `refs[1]` the
/// receiver, the rest are local slots.
#[must_use]
pub fn alloc_activation(
    space: &mut Semispace,
    method: Ref,
    receiver: Ref,
    locals: &[Ref],
    identity_hash: u32,
) -> Option<Ref> {
    let mut refs = Vec::with_capacity(2 + locals.len());
    refs.push(method);
    refs.push(receiver);
    refs.extend_from_slice(locals);
    alloc_refs(space, ClassId::ACTIVATION, &refs, identity_hash)
}

/// Allocate a fixed-arity ephemeron (spec §3.4, §4.1.5, Hayes semantics): a
/// key, a value, and a finalizer, none traced as a strong root directly —
/// the scavenger decides their fate during the fixed-point pass.
#[must_use]
pub fn alloc_ephemeron(
    space: &mut Semispace,
    key: Ref,
    value: Ref,
    finalizer: Ref,
    identity_hash: u32,
) -> Option<Ref> {
    let addr = alloc_header_and_hash(space, ClassId::EPHEMERON, HEADER_WORDS + 3, identity_hash)?;
    space.write_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), key.as_word());
    space.write_word(addr.add(ELEMENTS_OR_VALUE_OFFSET * WORD_BYTES), value.as_word());
    space.write_word(addr.add(EPHEMERON_FINALIZER_OFFSET * WORD_BYTES), finalizer.as_word());
    Some(Ref::heap(addr))
}

fn alloc_bytes(
    space: &mut Semispace,
    class_id: ClassId,
    bytes: &[u8],
    identity_hash: u32,
) -> Option<Ref> {
    let total_words = HEADER_WORDS + 1 + words_for_bytes(bytes.len());
    let addr = alloc_header_and_hash(space, class_id, total_words, identity_hash)?;
    space.write_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), bytes.len() as u64);
    for (index, chunk) in bytes.chunks(8).enumerate() {
        let mut word_bytes = [0u8; 8];
        word_bytes[..chunk.len()].copy_from_slice(chunk);
        let offset = (ELEMENTS_OR_VALUE_OFFSET + index as u64) * WORD_BYTES;
        space.write_word(addr.add(offset), u64::from_ne_bytes(word_bytes));
    }
    Some(Ref::heap(addr))
}

#[must_use]
pub fn alloc_byte_array(space: &mut Semispace, bytes: &[u8], identity_hash: u32) -> Option<Ref> {
    alloc_bytes(space, ClassId::BYTE_ARRAY, bytes, identity_hash)
}

#[must_use]
pub fn alloc_byte_string(space: &mut Semispace, bytes: &[u8], identity_hash: u32) -> Option<Ref> {
    alloc_bytes(space, ClassId::BYTE_STRING, bytes, identity_hash)
}

#[must_use]
pub fn alloc_wide_string(
    space: &mut Semispace,
    codepoints: &[u32],
    identity_hash: u32,
) -> Option<Ref> {
    let bytes: Vec<u8> = codepoints.iter().flat_map(|c| c.to_ne_bytes()).collect();
    let total_words = HEADER_WORDS + 1 + words_for_bytes(bytes.len());
    let addr = alloc_header_and_hash(space, ClassId::WIDE_STRING, total_words, identity_hash)?;
    space.write_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), codepoints.len() as u64);
    for (index, chunk) in bytes.chunks(8).enumerate() {
        let mut word_bytes = [0u8; 8];
        word_bytes[..chunk.len()].copy_from_slice(chunk);
        let offset = (ELEMENTS_OR_VALUE_OFFSET + index as u64) * WORD_BYTES;
        space.write_word(addr.add(offset), u64::from_ne_bytes(word_bytes));
    }
    Some(Ref::heap(addr))
}

#[must_use]
pub fn alloc_medium_int(space: &mut Semispace, value: i64, identity_hash: u32) -> Option<Ref> {
    let addr = alloc_header_and_hash(space, ClassId::MEDIUM_INT, HEADER_WORDS + 1, identity_hash)?;
    #[expect(clippy::cast_sign_loss, reason = "bit pattern preserved, recovered with as i64 on read")]
    space.write_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), value as u64);
    Some(Ref::heap(addr))
}

#[must_use]
pub fn alloc_float64(space: &mut Semispace, value: f64, identity_hash: u32) -> Option<Ref> {
    let addr = alloc_header_and_hash(space, ClassId::FLOAT64, HEADER_WORDS + 1, identity_hash)?;
    space.write_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES), value.to_bits());
    Some(Ref::heap(addr))
}

/// Read back a medium integer's payload.
#[must_use]
pub fn read_medium_int(space: &Semispace, addr: Vaddr) -> i64 {
    #[expect(clippy::cast_possible_wrap, reason = "restoring the signed value written by alloc_medium_int")]
    let value = space.read_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES)) as i64;
    value
}

/// Read back a float64's payload.
#[must_use]
pub fn read_float64(space: &Semispace, addr: Vaddr) -> f64 {
    f64::from_bits(space.read_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES)))
}

/// Patch a single element of an already-allocated length-prefixed ref
/// array. Used by the snapshot deserializer's edge pass, which allocates
/// every object before any cross-references are known and only then fills
/// in slots that may point at objects materialized later in the same pass.
pub fn write_ref_at(space: &mut Semispace, addr: Vaddr, index: u64, value: Ref) {
    let offset = (ELEMENTS_OR_VALUE_OFFSET + index) * WORD_BYTES;
    space.write_word(addr.add(offset), value.as_word());
}

/// Read back the elements of a length-prefixed ref array (array, weak
/// array, user-defined instance, closure, activation).
#[must_use]
pub fn read_refs(space: &Semispace, addr: Vaddr) -> Vec<Ref> {
    let length = space.read_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES));
    (0..length)
        .map(|index| {
            let offset = (ELEMENTS_OR_VALUE_OFFSET + index) * WORD_BYTES;
            Ref::from_word(space.read_word(addr.add(offset)))
        })
        .collect()
}

/// Read back a byte array/string's payload.
#[must_use]
pub fn read_bytes(space: &Semispace, addr: Vaddr) -> Vec<u8> {
    let length = space.read_word(addr.add(LENGTH_OR_KEY_OFFSET * WORD_BYTES)) as usize;
    let mut out = Vec::with_capacity(length);
    let word_count = words_for_bytes(length);
    for index in 0..word_count {
        let offset = (ELEMENTS_OR_VALUE_OFFSET + index) * WORD_BYTES;
        out.extend_from_slice(&space.read_word(addr.add(offset)).to_ne_bytes());
    }
    out.truncate(length);
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn refs_round_trip() {
        let mut space = Semispace::new(64).expect("map");
        let elements = vec![Ref::small_int(1).unwrap(), Ref::small_int(2).unwrap()];
        let r = alloc_refs(&mut space, ClassId::ARRAY, &elements, 7).expect("room");
        let addr = r.heap_addr().expect("heap ref");
        assert_eq!(read_refs(&space, addr), elements);
    }

    #[test]
    fn bytes_round_trip_including_partial_final_word() {
        let mut space = Semispace::new(64).expect("map");
        let bytes = b"hello world".to_vec();
        let r = alloc_byte_string(&mut space, &bytes, 1).expect("room");
        let addr = r.heap_addr().expect("heap ref");
        assert_eq!(read_bytes(&space, addr), bytes);
    }

    #[test]
    fn medium_int_round_trips_negative_values() {
        let mut space = Semispace::new(64).expect("map");
        let r = alloc_medium_int(&mut space, -12345, 1).expect("room");
        let addr = r.heap_addr().expect("heap ref");
        assert_eq!(read_medium_int(&space, addr), -12345);
    }

    #[test]
    fn float64_round_trips() {
        let mut space = Semispace::new(64).expect("map");
        let r = alloc_float64(&mut space, std::f64::consts::PI, 1).expect("room");
        let addr = r.heap_addr().expect("heap ref");
        assert!((read_float64(&space, addr) - std::f64::consts::PI).abs() < f64::EPSILON);
    }

    #[test]
    fn ephemeron_key_value_and_finalizer_are_at_fixed_offsets() {
        let mut space = Semispace::new(64).expect("map");
        let key = Ref::small_int(10).unwrap();
        let value = Ref::small_int(20).unwrap();
        let finalizer = Ref::small_int(30).unwrap();
        let r = alloc_ephemeron(&mut space, key, value, finalizer, 1).expect("room");
        let addr = r.heap_addr().expect("heap ref");
        assert_eq!(Ref::from_word(space.read_word(addr.add(16))), key);
        assert_eq!(Ref::from_word(space.read_word(addr.add(24))), value);
        assert_eq!(Ref::from_word(space.read_word(addr.add(32))), finalizer);
    }
}
