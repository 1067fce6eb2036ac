// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Print and `strerror` facade.
//!
//! Grounded on `original_source/src/vm/os.h`: the VM never uses `println!`
//! directly in its lower layers so that fatal-error output (§7) and
//! interpreter-visible `print` primitives funnel through one place.

/// Write `s` to stderr, unbuffered, without panicking on a broken pipe.
pub fn print_stderr(s: &str) {
    use std::io::Write;
    let mut stderr = std::io::stderr();
    let _ = stderr.write_all(s.as_bytes());
    let _ = stderr.flush();
}

/// Render an OS errno as a human-readable string.
///
/// On Unix this is `strerror(3)`; the returned string is always valid UTF-8
/// (non-UTF-8 bytes are replaced), matching `original_source/vm/os_linux.cc`'s
/// use of `strerror_r`.
#[must_use]
pub fn strerror(errno: i32) -> String {
    #[cfg(unix)]
    {
        // SAFETY: strerror returns a pointer to a static or thread-local
        // buffer that remains valid for the duration of this call.
        let ptr = unsafe { libc::strerror(errno) };
        if ptr.is_null() {
            return format!("unknown error {errno}");
        }
        // SAFETY: ptr is a valid NUL-terminated C string per strerror's contract.
        let cstr = unsafe { std::ffi::CStr::from_ptr(ptr) };
        cstr.to_string_lossy().into_owned()
    }
    #[cfg(not(unix))]
    {
        format!("error code {errno}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn strerror_is_nonempty() {
        assert!(!strerror(1).is_empty());
    }

    #[test]
    fn print_stderr_does_not_panic() {
        print_stderr("test output\n");
    }
}
