// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("{call} failed with errno {errno}")]
    Syscall { call: &'static str, errno: i32 },

    #[error("handle {handle} is not registered with this reactor")]
    NotRegistered { handle: u32 },
}

impl ReactorError {
    #[cfg(unix)]
    pub(crate) fn from_errno(call: &'static str) -> Self {
        // SAFETY: errno() only reads thread-local state.
        let errno = unsafe { *libc::__errno_location() };
        Self::Syscall { call, errno }
    }
}
