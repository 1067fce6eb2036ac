// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use thiserror::Error;

/// Errors an isolate-level operation can report.
#[derive(Debug, Error)]
pub enum IsolateError {
    #[error("heap operation failed: {0}")]
    Heap(#[from] moth_heap::HeapError),
    #[error("reactor operation failed: {0}")]
    Reactor(#[from] moth_reactor::ReactorError),
    #[error("could not schedule isolate on the pool: {0}")]
    Pool(#[from] moth_pool::PoolError),
}
