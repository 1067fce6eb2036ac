// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The two-pass cluster trait (spec §6.2), grounded on
//! `original_source/src/vm/snapshot.h`'s `Cluster` base class: `ReadNodes`
//! allocates every object the cluster describes (so back-references to
//! them resolve during the edge pass even across clusters read later),
//! then `ReadEdges` fills in cross-references once every object in the
//! snapshot exists.

use moth_heap::Heap;

use crate::backref::BackRefTable;
use crate::error::SnapshotError;
use crate::reader::Reader;

pub trait Cluster {
    /// # Errors
    /// Returns a [`SnapshotError`] on truncated input or an allocation
    /// failure.
    fn read_nodes(
        &mut self,
        reader: &mut Reader<'_>,
        heap: &mut Heap,
        back_refs: &mut BackRefTable,
    ) -> Result<(), SnapshotError>;

    /// # Errors
    /// Returns a [`SnapshotError`] on truncated input or an unresolved
    /// back-reference.
    fn read_edges(
        &mut self,
        reader: &mut Reader<'_>,
        heap: &mut Heap,
        back_refs: &mut BackRefTable,
    ) -> Result<(), SnapshotError>;
}

/// Immediate small integers: allocation-free, so `read_edges` has nothing
/// to do (they carry no outgoing references). Grounded on
/// `original_source/src/vm/snapshot.h`'s `SmallIntegerCluster`.
#[derive(Default)]
pub struct SmallIntegerCluster {
    count: u32,
}

impl Cluster for SmallIntegerCluster {
    fn read_nodes(
        &mut self,
        reader: &mut Reader<'_>,
        _heap: &mut Heap,
        back_refs: &mut BackRefTable,
    ) -> Result<(), SnapshotError> {
        self.count = reader.read_unsigned32()?;
        for _ in 0..self.count {
            let value = reader.read_i64()?;
            let small_int = moth_heap::Ref::small_int(value).ok_or(SnapshotError::SmallIntOutOfRange { value })?;
            back_refs.register(small_int);
        }
        Ok(())
    }

    fn read_edges(
        &mut self,
        _reader: &mut Reader<'_>,
        _heap: &mut Heap,
        _back_refs: &mut BackRefTable,
    ) -> Result<(), SnapshotError> {
        Ok(())
    }
}

/// `Array` objects: each node reserves `length` elements as placeholders,
/// then the edge pass resolves each slot's back-reference. Grounded on
/// `original_source/src/vm/snapshot.h`'s `ArrayCluster`.
#[derive(Default)]
pub struct ArrayCluster {
    lengths: Vec<u32>,
    objects: Vec<moth_heap::Ref>,
}

impl Cluster for ArrayCluster {
    fn read_nodes(
        &mut self,
        reader: &mut Reader<'_>,
        heap: &mut Heap,
        back_refs: &mut BackRefTable,
    ) -> Result<(), SnapshotError> {
        let count = reader.read_unsigned32()?;
        let placeholder = moth_heap::Ref::small_int(0).unwrap_or_else(|| unreachable!("0 is representable"));
        for _ in 0..count {
            let length = reader.read_unsigned32()?;
            let elements = vec![placeholder; length as usize];
            let array = heap.alloc_array(&elements, back_refs)?;
            back_refs.register(array);
            self.lengths.push(length);
            self.objects.push(array);
        }
        Ok(())
    }

    fn read_edges(
        &mut self,
        reader: &mut Reader<'_>,
        heap: &mut Heap,
        back_refs: &mut BackRefTable,
    ) -> Result<(), SnapshotError> {
        for (array, length) in self.objects.iter().zip(&self.lengths) {
            for index in 0..u64::from(*length) {
                let back_ref_index = reader.read_unsigned32()?;
                let element = back_refs.resolve(back_ref_index)?;
                heap.write_ref_at(*array, index, element);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use moth_heap::HeapConfig;

    fn heap() -> Heap {
        Heap::new(HeapConfig::default()).expect("heap construction")
    }

    #[test]
    fn small_integer_cluster_registers_every_value() {
        let mut bytes = vec![2u8]; // count=2 as a single-byte varint
        bytes.extend_from_slice(&5i64.to_le_bytes());
        bytes.extend_from_slice(&(-7i64).to_le_bytes());
        let mut reader = Reader::new(&bytes);
        let mut heap = heap();
        let mut back_refs = BackRefTable::new();
        let mut cluster = SmallIntegerCluster::default();
        cluster.read_nodes(&mut reader, &mut heap, &mut back_refs).expect("read_nodes");
        assert_eq!(back_refs.resolve(1).expect("first").small_int_value(), Some(5));
        assert_eq!(back_refs.resolve(2).expect("second").small_int_value(), Some(-7));
    }
}
