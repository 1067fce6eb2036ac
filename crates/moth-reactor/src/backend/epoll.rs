// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Linux backend over `epoll`, grounded on
//! `original_source/vm/message_loop_epoll.cc`: one `epoll` instance per
//! reactor, `EPOLLONESHOT`-free level-triggered watches, handle ids carried
//! in `epoll_event::u64` so readiness events map straight back to a
//! [`HandleTable`] entry without a second lookup table.

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::ReactorError;
use crate::handles::HandleTable;
use crate::interest::{Interest, ReadinessEvent};
use crate::{RawSource, ReactorBackend};

fn epoll_events_for(interest: Interest) -> u32 {
    let mut events = 0;
    if interest.readable {
        events |= libc::EPOLLIN as u32;
    }
    if interest.writable {
        events |= libc::EPOLLOUT as u32;
    }
    events
}

/// `epoll_create1` + `epoll_ctl`/`epoll_wait` backend.
pub struct EpollBackend {
    epoll_fd: RawFd,
    registered: HandleTable<RawSource>,
}

impl EpollBackend {
    /// Create a new `epoll` instance.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if `epoll_create1` fails.
    pub fn new() -> Result<Self, ReactorError> {
        // SAFETY: epoll_create1 has no preconditions beyond a valid flags
        // argument; 0 is always valid.
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(ReactorError::from_errno("epoll_create1"));
        }
        Ok(Self {
            epoll_fd,
            registered: HandleTable::new(),
        })
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        // SAFETY: epoll_fd was returned by epoll_create1 in `new` and is
        // only closed here.
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

impl ReactorBackend for EpollBackend {
    fn register(&mut self, source: RawSource, interest: Interest) -> Result<u32, ReactorError> {
        let handle = self.registered.insert(source);
        let mut event = libc::epoll_event {
            events: epoll_events_for(interest),
            u64: u64::from(handle),
        };
        // SAFETY: epoll_fd is a live epoll instance, source is a raw fd the
        // caller owns, and `event` is a valid, fully-initialized epoll_event.
        let result = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, source, &raw mut event) };
        if result < 0 {
            self.registered.remove(handle);
            return Err(ReactorError::from_errno("epoll_ctl(ADD)"));
        }
        Ok(handle)
    }

    fn modify(&mut self, handle: u32, interest: Interest) -> Result<(), ReactorError> {
        let source = *self
            .registered
            .get(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        let mut event = libc::epoll_event {
            events: epoll_events_for(interest),
            u64: u64::from(handle),
        };
        // SAFETY: source was previously added with ADD and is still open;
        // `event` is fully initialized.
        let result = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_MOD, source, &raw mut event) };
        if result < 0 {
            return Err(ReactorError::from_errno("epoll_ctl(MOD)"));
        }
        Ok(())
    }

    fn deregister(&mut self, handle: u32) -> Result<(), ReactorError> {
        let source = self
            .registered
            .remove(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        // SAFETY: source was previously added and the table entry is being
        // removed now, so it cannot be deregistered twice. The final
        // argument is ignored by the kernel for DEL since Linux 2.6.9 but
        // must still point to a valid epoll_event.
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        let result = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, source, &raw mut event) };
        if result < 0 {
            return Err(ReactorError::from_errno("epoll_ctl(DEL)"));
        }
        Ok(())
    }

    fn poll_once(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadinessEvent>, ReactorError> {
        let timeout_ms = match timeout {
            Some(duration) => i32::try_from(duration.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };
        let mut raw_events: [libc::epoll_event; 64] = unsafe { std::mem::zeroed() };
        // SAFETY: epoll_fd is live, raw_events is a valid buffer of the
        // given length, and timeout_ms is either -1 (block) or a clamped
        // non-negative value.
        let count = unsafe {
            libc::epoll_wait(self.epoll_fd, raw_events.as_mut_ptr(), raw_events.len() as i32, timeout_ms)
        };
        if count < 0 {
            return Err(ReactorError::from_errno("epoll_wait"));
        }
        #[allow(clippy::cast_sign_loss)]
        let count = count as usize;
        let events = raw_events[..count]
            .iter()
            .map(|event| ReadinessEvent {
                handle: event.u64 as u32,
                readable: event.events & (libc::EPOLLIN as u32) != 0,
                writable: event.events & (libc::EPOLLOUT as u32) != 0,
            })
            .collect();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_poll_a_readable_pipe() {
        let mut backend = EpollBackend::new().expect("epoll_create1");
        let mut fds = [0; 2];
        // SAFETY: fds is a valid 2-element buffer for pipe(2).
        let result = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(result, 0, "pipe(2) failed");
        let [read_fd, write_fd] = fds;

        let handle = backend.register(read_fd, Interest::READABLE).expect("register");
        // SAFETY: write_fd is open and `b"x"` is a valid 1-byte buffer.
        unsafe {
            libc::write(write_fd, b"x".as_ptr().cast(), 1);
        }

        let events = backend
            .poll_once(Some(Duration::from_secs(5)))
            .expect("poll_once");
        assert_eq!(events, vec![ReadinessEvent { handle, readable: true, writable: false }]);

        backend.deregister(handle).expect("deregister");
        // SAFETY: both fds were opened by pipe(2) above and are not used
        // again after this point.
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn modifying_unregistered_handle_errors() {
        let mut backend = EpollBackend::new().expect("epoll_create1");
        assert!(matches!(
            backend.modify(7, Interest::BOTH),
            Err(ReactorError::NotRegistered { handle: 7 })
        ));
    }
}
