// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Snapshot primitive decoding and the two-pass cluster-reading skeleton
//! (spec §6.2). The wire format itself — which cluster kinds exist, their
//! byte layout, the class/method encoding — is out of scope; this crate
//! gives a real deserializer something to plug into: primitive readers,
//! a back-reference table that doubles as a GC root source during
//! deserialization, and a `Cluster` trait implemented by two concrete
//! shapes (`SmallIntegerCluster`, `ArrayCluster`) sufficient to exercise
//! the end-to-end scenarios in spec §8.

mod backref;
mod cluster;
mod deserializer;
mod error;
mod reader;

pub use backref::BackRefTable;
pub use cluster::{ArrayCluster, Cluster, SmallIntegerCluster};
pub use deserializer::Deserializer;
pub use error::SnapshotError;
pub use reader::Reader;
