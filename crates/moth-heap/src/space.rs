// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Semispace: a bump-pointer allocation arena backed by one `mmap`'d region
//! (spec §4.1.1, §4.1.4 step 1).
//!
//! Allocation starts at `base + W` (one word reserved at the front so the
//! "generation" parity invariant in spec §3.1 holds by construction: an
//! old-space header address is `0 mod 2W`, a new-space one is `W mod 2W`).
//! We don't implement generational collection (a Non-goal) — this is purely
//! a structural byproduct of how the base is aligned and where the bump
//! pointer starts.

use moth_platform::{PlatformError, Protection, VirtualMemory};

use crate::addr::Vaddr;
use crate::header::ALIGN_WORDS;

const WORD_BYTES: u64 = 8;

/// One half of the two-space heap: a contiguous, word-aligned region with a
/// bump pointer marking the allocated prefix.
pub struct Semispace {
    memory: VirtualMemory,
    /// Offset of the next free byte, relative to `memory.addr()`.
    top: u64,
}

impl Semispace {
    /// Map a fresh semispace of `words` words.
    ///
    /// # Errors
    /// Returns an error if the underlying `mmap`/`VirtualAlloc` call fails.
    pub fn new(words: u64) -> Result<Self, PlatformError> {
        let bytes = words.saturating_mul(WORD_BYTES);
        let memory = VirtualMemory::map(usize::try_from(bytes).unwrap_or(usize::MAX))?;
        // Reserve the first word so live data starts at base + W, giving new
        // space the W mod 2W parity spec §3.1 describes.
        Ok(Self { memory, top: WORD_BYTES })
    }

    #[must_use]
    pub fn base(&self) -> Vaddr {
        Vaddr::new(self.memory.addr() as u64)
    }

    #[must_use]
    pub fn capacity_words(&self) -> u64 {
        self.memory.len() as u64 / WORD_BYTES
    }

    #[must_use]
    pub fn used_words(&self) -> u64 {
        self.top / WORD_BYTES
    }

    #[must_use]
    pub fn free_words(&self) -> u64 {
        self.capacity_words().saturating_sub(self.used_words())
    }

    /// The next address that would be handed out by `bump`, without
    /// reserving it.
    #[must_use]
    pub fn top(&self) -> Vaddr {
        self.base().add(self.top)
    }

    /// Reset the bump pointer to the start of the space (used on flip, after
    /// the previous occupant has been fully scavenged out of it).
    pub fn reset(&mut self) {
        self.top = WORD_BYTES;
    }

    /// Allocate `size_words` words (already rounded by the caller to
    /// [`ALIGN_WORDS`]), returning the address of the first word.
    ///
    /// Returns `None` if the space doesn't have enough room; the caller
    /// interprets this as "needs a scavenge" or, after a scavenge, as
    /// "needs to grow" (spec §4.1.4 step 6).
    pub fn bump(&mut self, size_words: u64) -> Option<Vaddr> {
        debug_assert_eq!(size_words % ALIGN_WORDS, 0, "allocation size must be alignment-rounded");
        let size_bytes = size_words.checked_mul(WORD_BYTES)?;
        let new_top = self.top.checked_add(size_bytes)?;
        if new_top > self.memory.len() as u64 {
            return None;
        }
        let addr = self.base().add(self.top);
        self.top = new_top;
        Some(addr)
    }

    /// Read a raw word at `addr`.
    ///
    /// # Panics
    /// Panics in debug builds if `addr` falls outside the mapped region.
    #[must_use]
    pub fn read_word(&self, addr: Vaddr) -> u64 {
        let offset = addr.diff(self.base());
        debug_assert!(offset + WORD_BYTES <= self.memory.len() as u64, "read out of bounds");
        let slice = self.memory.as_slice();
        #[expect(clippy::cast_possible_truncation, reason = "offset already bounds-checked above")]
        let start = offset as usize;
        let bytes: [u8; 8] = slice[start..start + 8].try_into().unwrap_or([0; 8]);
        u64::from_ne_bytes(bytes)
    }

    /// Write a raw word at `addr`.
    ///
    /// # Panics
    /// Panics in debug builds if `addr` falls outside the mapped region.
    pub fn write_word(&mut self, addr: Vaddr, value: u64) {
        let offset = addr.diff(self.base());
        debug_assert!(offset + WORD_BYTES <= self.memory.len() as u64, "write out of bounds");
        let slice = self.memory.as_mut_slice();
        #[expect(clippy::cast_possible_truncation, reason = "offset already bounds-checked above")]
        let start = offset as usize;
        slice[start..start + 8].copy_from_slice(&value.to_ne_bytes());
    }

    /// Toggle `NoAccess` protection on the whole region, used to make sure
    /// from-space is never touched again after a flip (debug builds only
    /// bother calling this; it's a diagnostic, not a correctness dependency).
    ///
    /// # Errors
    /// Returns an error if the underlying `mprotect`/`VirtualProtect` call
    /// fails.
    pub fn protect(&mut self, protection: Protection) -> Result<(), PlatformError> {
        self.memory.set_protection(protection)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn bump_allocates_sequentially_and_respects_capacity() {
        let mut space = Semispace::new(16).expect("map");
        assert_eq!(space.used_words(), 1);
        let a = space.bump(2).expect("room");
        let b = space.bump(2).expect("room");
        assert_eq!(b.diff(a), 16);
        assert_eq!(space.used_words(), 5);
    }

    #[test]
    fn bump_fails_when_space_is_exhausted() {
        let mut space = Semispace::new(4).expect("map");
        assert!(space.bump(2).is_some());
        assert!(space.bump(4).is_none());
    }

    #[test]
    fn reset_reclaims_the_whole_space() {
        let mut space = Semispace::new(8).expect("map");
        space.bump(4).expect("room");
        space.reset();
        assert_eq!(space.used_words(), 1);
        assert!(space.bump(6).is_some());
    }

    #[test]
    fn read_write_word_round_trips() {
        let mut space = Semispace::new(8).expect("map");
        let addr = space.bump(2).expect("room");
        space.write_word(addr, 0xDEAD_BEEF);
        assert_eq!(space.read_word(addr), 0xDEAD_BEEF);
    }

    #[test]
    fn base_is_word_aligned_so_new_space_parity_holds() {
        let space = Semispace::new(8).expect("map");
        assert!(space.base().is_aligned(16).unwrap_or(false));
        assert!(space.top().is_aligned(16).unwrap_or(false));
    }
}
