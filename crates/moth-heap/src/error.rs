// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap error types.

use thiserror::Error;

use crate::addr::Vaddr;

/// Recoverable failures surfaced by the heap. Allocation failure that
/// survives a scavenge-and-grow attempt is reported here rather than through
/// `fatal!`, so an isolate can decide how to react (spec §4.1.1, §7).
#[derive(Debug, Error)]
pub enum HeapError {
    #[error("out of memory: could not satisfy a {requested_words}-word allocation even after growing to {space_words} words per half")]
    OutOfMemory {
        requested_words: u64,
        space_words: u64,
    },

    #[error(transparent)]
    Platform(#[from] moth_platform::PlatformError),

    #[error("become: argument {index} ({addr}) is not a heap reference")]
    BecomeNotHeapRef { index: usize, addr: Vaddr },

    #[error("become: argument arrays have mismatched length: {left} vs {right}")]
    BecomeLengthMismatch { left: usize, right: usize },

    #[error("become: objects at {left} and {right} have different sizes ({left_words} vs {right_words} words)")]
    BecomeSizeMismatch {
        left: Vaddr,
        right: Vaddr,
        left_words: u64,
        right_words: u64,
    },

    #[error("become: argument arrays are not pairwise distinct")]
    BecomeNotDistinct,

    #[error("handle scope stack depth exceeded (max {max})")]
    HandleScopeOverflow { max: usize },

    #[error("no handle scope is currently open")]
    NoHandleScope,

    #[error("class table slot {class_id} is not in use")]
    UnknownClass { class_id: u32 },
}
