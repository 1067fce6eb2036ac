// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Backend implementations of [`crate::ReactorBackend`].
//!
//! Grounded on `original_source/vm/message_loop_epoll.cc`,
//! `message_loop_kqueue.cc`, and `message_loop_iocp.cc`: one backend per
//! platform polling primitive, plus [`blocking::BlockingBackend`] (not in
//! the original source) so tests and embedders that don't need real I/O
//! can run the same reactor loop without a live epoll/kqueue instance.

pub mod blocking;

#[cfg(target_os = "linux")]
pub mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub mod kqueue;

#[cfg(windows)]
pub mod iocp;
