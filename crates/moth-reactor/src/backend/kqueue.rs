// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! BSD/macOS backend over `kqueue`, grounded on
//! `original_source/vm/message_loop_kqueue.cc`: readable and writable
//! interest are two independent filters (`EVFILT_READ`/`EVFILT_WRITE`)
//! registered or withdrawn independently, with the handle id carried in
//! `kevent::udata`.

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::ReactorError;
use crate::handles::HandleTable;
use crate::interest::{Interest, ReadinessEvent};
use crate::{RawSource, ReactorBackend};

fn kevent_change(source: RawFd, filter: i16, flags: u16, handle: u32) -> libc::kevent {
    libc::kevent {
        ident: source as usize,
        filter,
        flags,
        fflags: 0,
        data: 0,
        udata: handle as *mut libc::c_void,
    }
}

/// `kqueue(2)` + `kevent(2)` backend.
pub struct KqueueBackend {
    kq: RawFd,
    registered: HandleTable<(RawSource, Interest)>,
}

impl KqueueBackend {
    /// Create a new `kqueue` instance.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if `kqueue(2)` fails.
    pub fn new() -> Result<Self, ReactorError> {
        // SAFETY: kqueue() has no preconditions.
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(ReactorError::from_errno("kqueue"));
        }
        Ok(Self {
            kq,
            registered: HandleTable::new(),
        })
    }

    fn apply(&self, changes: &[libc::kevent]) -> Result<(), ReactorError> {
        // SAFETY: kq is a live kqueue instance; `changes` is a valid slice
        // of fully-initialized kevent structs; no output buffer is
        // requested (nevents = 0).
        let result = unsafe {
            libc::kevent(
                self.kq,
                changes.as_ptr(),
                changes.len() as i32,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if result < 0 {
            return Err(ReactorError::from_errno("kevent(change)"));
        }
        Ok(())
    }
}

impl Drop for KqueueBackend {
    fn drop(&mut self) {
        // SAFETY: kq was returned by kqueue() in `new` and is only closed
        // here.
        unsafe {
            libc::close(self.kq);
        }
    }
}

impl ReactorBackend for KqueueBackend {
    fn register(&mut self, source: RawSource, interest: Interest) -> Result<u32, ReactorError> {
        let handle = self.registered.insert((source, interest));
        let mut changes = Vec::with_capacity(2);
        if interest.readable {
            changes.push(kevent_change(source, libc::EVFILT_READ, libc::EV_ADD, handle));
        }
        if interest.writable {
            changes.push(kevent_change(source, libc::EVFILT_WRITE, libc::EV_ADD, handle));
        }
        if let Err(error) = self.apply(&changes) {
            self.registered.remove(handle);
            return Err(error);
        }
        Ok(handle)
    }

    fn modify(&mut self, handle: u32, interest: Interest) -> Result<(), ReactorError> {
        let (source, previous) = *self
            .registered
            .get(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        let mut changes = Vec::with_capacity(2);
        if previous.readable != interest.readable {
            let flags = if interest.readable { libc::EV_ADD } else { libc::EV_DELETE };
            changes.push(kevent_change(source, libc::EVFILT_READ, flags, handle));
        }
        if previous.writable != interest.writable {
            let flags = if interest.writable { libc::EV_ADD } else { libc::EV_DELETE };
            changes.push(kevent_change(source, libc::EVFILT_WRITE, flags, handle));
        }
        self.apply(&changes)?;
        if let Some(slot) = self.registered.get_mut(handle) {
            slot.1 = interest;
        }
        Ok(())
    }

    fn deregister(&mut self, handle: u32) -> Result<(), ReactorError> {
        let (source, interest) = self
            .registered
            .remove(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        let mut changes = Vec::with_capacity(2);
        if interest.readable {
            changes.push(kevent_change(source, libc::EVFILT_READ, libc::EV_DELETE, handle));
        }
        if interest.writable {
            changes.push(kevent_change(source, libc::EVFILT_WRITE, libc::EV_DELETE, handle));
        }
        self.apply(&changes)
    }

    fn poll_once(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadinessEvent>, ReactorError> {
        let deadline = timeout.map(|duration| libc::timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: libc::c_long::from(duration.subsec_nanos()),
        });
        let deadline_ptr = deadline.as_ref().map_or(std::ptr::null(), std::ptr::from_ref);
        let mut raw_events: [libc::kevent; 64] = unsafe { std::mem::zeroed() };
        // SAFETY: kq is live, raw_events is a valid output buffer of the
        // given length, and deadline_ptr is either null (block forever) or
        // points at a valid initialized timespec.
        let count = unsafe {
            libc::kevent(
                self.kq,
                std::ptr::null(),
                0,
                raw_events.as_mut_ptr(),
                raw_events.len() as i32,
                deadline_ptr,
            )
        };
        if count < 0 {
            return Err(ReactorError::from_errno("kevent(poll)"));
        }
        #[allow(clippy::cast_sign_loss)]
        let count = count as usize;
        let events = raw_events[..count]
            .iter()
            .map(|event| {
                let handle = event.udata as u32;
                ReadinessEvent {
                    handle,
                    readable: event.filter == libc::EVFILT_READ,
                    writable: event.filter == libc::EVFILT_WRITE,
                }
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
        let mut backend = KqueueBackend::new().expect("kqueue");
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
        let mut backend = KqueueBackend::new().expect("kqueue");
        assert!(matches!(
            backend.modify(7, Interest::BOTH),
            Err(ReactorError::NotRegistered { handle: 7 })
        ));
    }
}
