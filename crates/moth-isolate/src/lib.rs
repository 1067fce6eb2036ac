// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The isolate: the scheduling unit handed to the thread pool, owning one
//! heap, one reactor, and one interpreter (spec §4.4). Generalizes the
//! teacher's `Process`-on-a-pool split into a first-class type so the pool
//! (`moth-pool`) schedules isolates directly instead of bare memory
//! regions.

mod error;
mod isolate;
mod registry;

pub use error::IsolateError;
pub use isolate::Isolate;
pub use registry::interrupt_all;
