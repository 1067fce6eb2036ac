// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Platform facade for the Moth VM.
//!
//! This crate is the leaf of the dependency graph: virtual memory mapping,
//! the monotonic clock, entropy, and `print`/`strerror` are the only places
//! the rest of the runtime touches the host OS directly. Everything above
//! this crate (`moth-heap`, `moth-reactor`, ...) is written against the
//! facade here, not against `libc` directly, so that a future port to a new
//! OS only has to replace this crate.
//!
//! Grounded on `original_source/vm/os.h`, `virtual_memory_posix.cc`, and
//! `virtual_memory_win.cc`: one small contract per concern, implemented once
//! per platform family behind `cfg`.

mod clock;
mod entropy;
mod fatal;
mod print;
mod vmem;

pub use clock::monotonic_nanos;
pub use entropy::{entropy_seed, fill_entropy};
pub use fatal::fatal_abort;
pub use print::{print_stderr, strerror};
pub use vmem::{Protection, VirtualMemory};

/// Errors raised by the platform facade.
///
/// These are all [`PlatformError`]-recoverable at the call site only in the
/// sense that the *caller* decides whether to treat them as fatal; the
/// facade itself never aborts on their behalf (aborting on mmap/VirtualAlloc
/// failure is the heap's decision, per spec §7).
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The underlying `mmap`/`VirtualAlloc` call failed.
    #[error("failed to map {size} bytes: {errno}")]
    MapFailed {
        /// Requested size in bytes.
        size: usize,
        /// Platform errno (or `GetLastError` code on Windows).
        errno: i32,
    },
    /// `mprotect`/`VirtualProtect` failed while changing protection.
    #[error("failed to protect region at {addr:#x}: {errno}")]
    ProtectFailed {
        /// Base address of the region.
        addr: usize,
        /// Platform errno (or `GetLastError` code on Windows).
        errno: i32,
    },
    /// `munmap`/`VirtualFree` failed.
    #[error("failed to unmap region at {addr:#x}: {errno}")]
    UnmapFailed {
        /// Base address of the region.
        addr: usize,
        /// Platform errno (or `GetLastError` code on Windows).
        errno: i32,
    },
}

/// Abort the process immediately, printing `file:line: message` to stderr.
///
/// Grounded on `original_source/vm/assert.h`'s `FATAL` macro. Never unwinds:
/// calls [`std::process::abort`], so it cannot be intercepted by a
/// `catch_unwind` an embedder might install around the interpreter.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        $crate::fatal_abort(file!(), line!(), format_args!($($arg)*))
    }};
}
