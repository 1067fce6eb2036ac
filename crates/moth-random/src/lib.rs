// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! xorshift128+ pseudo-random source.
//!
//! Grounded on `original_source/vm/random.cc`/`.h`. This is per-heap state
//! (spec §5: "Random: per-heap (no sharing)"), used by the heap to assign
//! identity hashes lazily on first read (spec §3.2) so that two objects
//! created back-to-back don't collide on a trivially predictable sequence.

/// A xorshift128+ generator.
///
/// Not cryptographically secure — it exists only to assign identity hashes
/// with a cheap, well-distributed sequence, matching the source's use of
/// the same algorithm for the same purpose.
#[derive(Debug, Clone)]
pub struct Random {
    state0: u64,
    state1: u64,
}

impl Random {
    /// Construct a generator from an explicit seed.
    ///
    /// The seed must not be `(0, 0)`; xorshift128+ with an all-zero state
    /// never produces anything but zero. Use [`Random::from_entropy`] unless
    /// a test needs a reproducible sequence.
    #[must_use]
    pub const fn new(seed0: u64, seed1: u64) -> Self {
        let (state0, state1) = if seed0 == 0 && seed1 == 0 {
            (1, 0)
        } else {
            (seed0, seed1)
        };
        Self { state0, state1 }
    }

    /// Construct a generator seeded from platform entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        let (a, b) = moth_platform::entropy_seed();
        Self::new(a, b)
    }

    /// Produce the next 64-bit value in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let mut s1 = self.state0;
        let s0 = self.state1;
        let result = s0.wrapping_add(s1);
        self.state0 = s0;
        s1 ^= s1 << 23;
        s1 ^= s1 >> 17;
        s1 ^= s0;
        s1 ^= s0 >> 26;
        self.state1 = s1;
        result
    }

    /// Produce a non-zero identity hash in the range a small-int header
    /// field can hold (30 bits, matching the source's identity-hash width).
    ///
    /// Hashes are never zero so that zero can mean "not yet assigned"
    /// (spec §3.2: "lazily initialised on first read").
    pub fn next_identity_hash(&mut self) -> u32 {
        loop {
            let candidate = (self.next_u64() as u32) & 0x3FFF_FFFF;
            if candidate != 0 {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::Random;

    #[test]
    fn zero_seed_is_remapped_to_nonzero_state() {
        let mut r = Random::new(0, 0);
        // A genuinely all-zero state would produce an endless run of zeros.
        assert_ne!(r.next_u64(), 0);
    }

    #[test]
    fn sequence_is_deterministic_for_a_fixed_seed() {
        let mut a = Random::new(1, 2);
        let mut b = Random::new(1, 2);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn identity_hash_is_never_zero() {
        let mut r = Random::new(1, 2);
        for _ in 0..10_000 {
            assert_ne!(r.next_identity_hash(), 0);
        }
    }

    proptest::proptest! {
        #[test]
        fn identity_hash_fits_30_bits(seed0: u64, seed1: u64) {
            let mut r = Random::new(seed0, seed1);
            let h = r.next_identity_hash();
            proptest::prop_assert!(h <= 0x3FFF_FFFF);
            proptest::prop_assert_ne!(h, 0);
        }
    }
}
