// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Drives a sequence of [`Cluster`]s through both passes (spec §6.2),
//! grounded on `original_source/src/vm/snapshot.h`'s `Deserializer`.

use moth_heap::{Heap, Ref};
use tracing::{debug, instrument};

use crate::backref::BackRefTable;
use crate::cluster::Cluster;
use crate::error::SnapshotError;
use crate::reader::Reader;

pub struct Deserializer<'a> {
    reader: Reader<'a>,
    back_refs: BackRefTable,
}

impl<'a> Deserializer<'a> {
    #[must_use]
    pub fn new(snapshot: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(snapshot),
            back_refs: BackRefTable::new(),
        }
    }

    /// Run every cluster's `read_nodes`, then every cluster's `read_edges`,
    /// in the order given — never interleaved, so a cluster read later can
    /// still be the target of a back-reference written by one read
    /// earlier (spec §6.2's two-pass requirement).
    ///
    /// # Errors
    /// Returns a [`SnapshotError`] if the snapshot is truncated, contains an
    /// unresolved back-reference, or an allocation fails.
    #[instrument(skip(self, heap, clusters))]
    pub fn deserialize(&mut self, heap: &mut Heap, clusters: &mut [Box<dyn Cluster>]) -> Result<(), SnapshotError> {
        for cluster in clusters.iter_mut() {
            cluster.read_nodes(&mut self.reader, heap, &mut self.back_refs)?;
        }
        debug!(position = self.reader.position(), "snapshot nodes pass complete");
        for cluster in clusters.iter_mut() {
            cluster.read_edges(&mut self.reader, heap, &mut self.back_refs)?;
        }
        debug!(position = self.reader.position(), "snapshot edges pass complete");
        Ok(())
    }

    /// # Errors
    /// Returns [`SnapshotError::InvalidBackRef`] if `index` was never
    /// registered.
    pub fn back_ref(&self, index: u32) -> Result<Ref, SnapshotError> {
        self.back_refs.resolve(index)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::cluster::{ArrayCluster, SmallIntegerCluster};
    use moth_heap::HeapConfig;

    fn heap() -> Heap {
        Heap::new(HeapConfig::default()).expect("heap construction")
    }

    fn varint(mut value: u32, out: &mut Vec<u8>) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    /// A minimal synthetic snapshot: two small integers, then one array
    /// holding back-references to both (spec §6.2's "minimal synthetic
    /// snapshot containing only an ObjectStore and a scheduler root" is the
    /// same shape scaled down to what this crate's skeleton can represent
    /// without a real class/bytecode schema).
    #[test]
    fn deserializes_two_small_integers_and_an_array_of_them() {
        let mut bytes = Vec::new();
        varint(2, &mut bytes); // SmallIntegerCluster: 2 entries
        bytes.extend_from_slice(&11i64.to_le_bytes());
        bytes.extend_from_slice(&22i64.to_le_bytes());
        varint(1, &mut bytes); // ArrayCluster: 1 array
        varint(2, &mut bytes); // length 2
        varint(1, &mut bytes); // edge 0 -> back-ref 1 (value 11)
        varint(2, &mut bytes); // edge 1 -> back-ref 2 (value 22)

        let mut heap = heap();
        let mut clusters: Vec<Box<dyn Cluster>> = vec![
            Box::new(SmallIntegerCluster::default()),
            Box::new(ArrayCluster::default()),
        ];
        let mut deserializer = Deserializer::new(&bytes);
        deserializer.deserialize(&mut heap, &mut clusters).expect("deserialize");

        let array = deserializer.back_ref(3).expect("array back-ref");
        let elements = heap.read_refs(array);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].small_int_value(), Some(11));
        assert_eq!(elements[1].small_int_value(), Some(22));
    }
}
