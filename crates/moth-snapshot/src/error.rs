// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot at byte offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("unsigned32 varint longer than 5 bytes at offset {offset}")]
    VarintTooLong { offset: usize },

    #[error("back-reference index {index} is out of range or the reserved sentinel")]
    InvalidBackRef { index: u32 },

    #[error("unknown cluster tag {tag}")]
    UnknownClusterTag { tag: u8 },

    #[error("small integer {value} does not fit the tagged representable range")]
    SmallIntOutOfRange { value: i64 },

    #[error(transparent)]
    Heap(#[from] moth_heap::HeapError),
}
