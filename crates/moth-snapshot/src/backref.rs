// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The back-reference table built across both deserialization passes (spec
//! §6.2): `ReadNodes` allocates an object and registers it here; `ReadEdges`
//! resolves a back-reference index to the object it names. Grounded on
//! `original_source/src/vm/snapshot.h`'s `Deserializer::RegisterBackRef`/
//! `BackRef`: indices are 1-based, slot 0 is a reserved sentinel
//! (`ASSERT(i > 0)` in the original).

use moth_heap::{Ref, RootSource};

use crate::error::SnapshotError;

pub struct BackRefTable {
    refs: Vec<Ref>,
}

impl Default for BackRefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BackRefTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            refs: vec![Ref::small_int(0).unwrap_or_else(|| unreachable!("0 is representable"))],
        }
    }

    /// Register `value` as the next back-reference, returning its index.
    pub fn register(&mut self, value: Ref) -> u32 {
        self.refs.push(value);
        u32::try_from(self.refs.len() - 1).unwrap_or_else(|_| unreachable!("snapshot back-ref count fits u32"))
    }

    /// # Errors
    /// Returns [`SnapshotError::InvalidBackRef`] if `index` is `0` (the
    /// reserved sentinel) or beyond every object registered so far.
    pub fn resolve(&self, index: u32) -> Result<Ref, SnapshotError> {
        if index == 0 {
            return Err(SnapshotError::InvalidBackRef { index });
        }
        self.refs
            .get(index as usize)
            .copied()
            .ok_or(SnapshotError::InvalidBackRef { index })
    }
}

impl RootSource for BackRefTable {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut Ref)) {
        for r in &mut self.refs {
            visitor(r);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn index_zero_is_rejected() {
        let table = BackRefTable::new();
        assert!(matches!(table.resolve(0), Err(SnapshotError::InvalidBackRef { index: 0 })));
    }

    #[test]
    fn registered_objects_resolve_by_index() {
        let mut table = BackRefTable::new();
        let a = Ref::small_int(1).expect("representable");
        let b = Ref::small_int(2).expect("representable");
        let ia = table.register(a);
        let ib = table.register(b);
        assert_eq!(table.resolve(ia).expect("resolve a"), a);
        assert_eq!(table.resolve(ib).expect("resolve b"), b);
    }
}
