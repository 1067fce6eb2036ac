// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Monotonic clock facade.
//!
//! Spec §5: "expressed as absolute monotonic deadlines in nanoseconds...
//! never goes backwards and is not affected by wall-clock adjustments."
//! `std::time::Instant` already gives this guarantee on every platform Rust
//! supports, so this module exists only to pin the nanosecond representation
//! used throughout the reactor and to give the rest of the runtime a single
//! substitution point (tests can't fake `Instant`, but they can fake a
//! `Clock` trait object wrapping this function).

use std::sync::OnceLock;
use std::time::Instant;

fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Nanoseconds elapsed since an arbitrary, process-wide fixed epoch.
///
/// Never goes backwards. Two calls to this function are directly comparable
/// as deadlines; spec §4.2.3's "0 means no wakeup pending" relies on the
/// epoch being fixed at first use so that `0` is never a value this function
/// can return in practice (the first call happens before any deadline is
/// computed from it).
#[must_use]
pub fn monotonic_nanos() -> u64 {
    let elapsed = Instant::now().saturating_duration_since(epoch());
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::monotonic_nanos;

    #[test]
    fn never_goes_backwards() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }

    #[test]
    fn is_nonzero_shortly_after_first_use() {
        let _ = monotonic_nanos();
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(monotonic_nanos() > 0);
    }
}
