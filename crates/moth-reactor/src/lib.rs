// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Per-isolate reactor: a single-threaded cooperative event loop over
//! epoll, kqueue, IOCP, or a portable blocking backend (spec §4.2).
//!
//! Dispatch is FIFO within each event kind (messages, timers, signals);
//! across kinds the reactor drains whichever queues are non-empty each
//! iteration, messages first, matching the dispatch order shared by every
//! `original_source/vm/message_loop_{epoll,kqueue,iocp}.cc` backend and
//! `original_source/src/vm/message_loop_default.cc`.

pub mod backend;
mod error;
mod handles;
mod interest;
mod reactor;
mod timers;

pub use error::ReactorError;
pub use handles::HandleTable;
pub use interest::{Interest, ReadinessEvent};
pub use reactor::{INTERRUPTED_EXIT_CODE, Reactor, ReactorEvent};
pub use timers::{TimerId, TimerQueue};

/// The raw OS handle a backend polls: a file descriptor on Unix, a socket
/// handle on Windows.
#[cfg(unix)]
pub type RawSource = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawSource = std::os::windows::io::RawSocket;

/// What every backend (epoll, kqueue, IOCP, or the portable blocking
/// fallback) must provide.
pub trait ReactorBackend {
    /// Start watching `source` for `interest`, returning the handle id the
    /// reactor should use to refer to this registration from now on.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if the underlying OS call fails.
    fn register(&mut self, source: RawSource, interest: Interest) -> Result<u32, ReactorError>;

    /// Change the interest set for an already-registered handle.
    ///
    /// # Errors
    /// Returns [`ReactorError::NotRegistered`] if `handle` is unknown, or
    /// [`ReactorError::Syscall`] if the underlying OS call fails.
    fn modify(&mut self, handle: u32, interest: Interest) -> Result<(), ReactorError>;

    /// Stop watching a handle.
    ///
    /// # Errors
    /// Returns [`ReactorError::NotRegistered`] if `handle` is unknown, or
    /// [`ReactorError::Syscall`] if the underlying OS call fails.
    fn deregister(&mut self, handle: u32) -> Result<(), ReactorError>;

    /// Block for up to `timeout` (or indefinitely if `None`), returning
    /// whatever readiness events fired.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if the underlying OS call fails.
    fn poll_once(
        &mut self,
        timeout: Option<std::time::Duration>,
    ) -> Result<Vec<ReadinessEvent>, ReactorError>;
}

/// Construct the default backend for the host platform.
///
/// # Errors
/// Returns [`ReactorError::Syscall`] if the backend's setup call
/// (`epoll_create1`, `kqueue`, `CreateIoCompletionPort`, ...) fails.
#[cfg(target_os = "linux")]
pub fn default_backend() -> Result<backend::epoll::EpollBackend, ReactorError> {
    backend::epoll::EpollBackend::new()
}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub fn default_backend() -> Result<backend::kqueue::KqueueBackend, ReactorError> {
    backend::kqueue::KqueueBackend::new()
}

#[cfg(windows)]
pub fn default_backend() -> Result<backend::iocp::IocpBackend, ReactorError> {
    backend::iocp::IocpBackend::new()
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
    windows
)))]
pub fn default_backend() -> Result<backend::blocking::BlockingBackend, ReactorError> {
    Ok(backend::blocking::BlockingBackend::new())
}
