// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Fatal-error termination.
//!
//! Spec §7: "fatal errors never unwind; they abort." Grounded on
//! `original_source/vm/assert.h`'s `FATAL` macro, which prints the call site
//! and calls the platform's abort routine. Use the [`crate::fatal!`] macro
//! rather than calling [`fatal_abort`] directly so the call site is captured
//! automatically.

use crate::print::print_stderr;
use std::fmt::Arguments;

/// Print `file:line: message` to stderr and abort the process.
///
/// Never returns. Does not unwind, so it cannot be intercepted by a
/// `catch_unwind` an embedder installs around the interpreter.
#[cold]
pub fn fatal_abort(file: &str, line: u32, message: Arguments<'_>) -> ! {
    tracing::error!(file, line, %message, "fatal error, aborting");
    print_stderr(&format!("{file}:{line}: fatal error: {message}\n"));
    std::process::abort();
}
