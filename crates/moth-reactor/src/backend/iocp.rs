// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Windows backend over an I/O completion port, grounded on
//! `original_source/vm/message_loop_iocp.cc`. Unlike epoll/kqueue,
//! readiness here means "an overlapped operation completed", not "the
//! socket became readable" — `GetQueuedCompletionStatus` hands back the
//! completion key the handle was associated with at `CreateIoCompletionPort`
//! time, which this backend sets to the handle id.
//!
//! `register`/`modify`/`deregister` only track bookkeeping (IOCP has no way
//! to detach a handle from a port once associated); actual overlapped I/O
//! submission is the embedder's job, same as in the original source.

use std::collections::HashMap;
use std::os::windows::io::RawSocket;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use windows_sys::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Networking::WinSock::WSAGetLastError;
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED, PostQueuedCompletionStatus,
};

use crate::error::ReactorError;
use crate::handles::HandleTable;
use crate::interest::{Interest, ReadinessEvent};
use crate::{RawSource, ReactorBackend};

/// What a handle id registered with this backend refers to. `poll_once`
/// uses this to decide whether a completion is ordinary socket readiness,
/// a pipe I/O completion, or a child process's exit (spec §4.2.6).
enum Entry {
    Socket(RawSource, Interest),
    Pipe,
    Process,
}

/// `CreateIoCompletionPort` + `GetQueuedCompletionStatus` backend.
pub struct IocpBackend {
    port: HANDLE,
    registered: HandleTable<Entry>,
    exit_codes: Arc<Mutex<HashMap<u32, u32>>>,
}

impl IocpBackend {
    /// Create a new completion port.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if `CreateIoCompletionPort` fails.
    pub fn new() -> Result<Self, ReactorError> {
        // SAFETY: passing INVALID_HANDLE_VALUE with a null existing port
        // creates a fresh, unassociated completion port.
        let port = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, std::ptr::null_mut(), 0, 0) };
        if port.is_null() {
            return Err(Self::last_error("CreateIoCompletionPort"));
        }
        Ok(Self {
            port,
            registered: HandleTable::new(),
            exit_codes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn last_error(call: &'static str) -> ReactorError {
        // SAFETY: WSAGetLastError reads thread-local state.
        let errno = unsafe { WSAGetLastError() };
        ReactorError::Syscall { call, errno }
    }

    /// Retrieve and clear the exit code a [`Self::start_process`] child
    /// posted, once its process handle's [`ReadinessEvent`] has fired.
    #[must_use]
    pub fn take_exit_code(&mut self, handle: u32) -> Option<u32> {
        self.exit_codes.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&handle)
    }
}

impl Drop for IocpBackend {
    fn drop(&mut self) {
        // SAFETY: port was returned by CreateIoCompletionPort in `new` and
        // is only closed here.
        unsafe {
            windows_sys::Win32::Foundation::CloseHandle(self.port);
        }
    }
}

/// Handle ids returned by [`IocpBackend::start_process`] (spec §4.2.6).
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandles {
    pub process: u32,
    pub stdin: u32,
    pub stdout: u32,
    pub stderr: u32,
}

/// Passed through `RegisterWaitForSingleObject`'s opaque context pointer;
/// reconstructed by [`exit_callback`] on the wait's own worker thread.
struct ExitContext {
    handle: u32,
    process: HANDLE,
    port: HANDLE,
    exit_codes: Arc<Mutex<HashMap<u32, u32>>>,
}

/// Runs on a thread-pool thread owned by `RegisterWaitForSingleObject`;
/// records the child's real exit code, then posts a completion so the
/// owning reactor's `GetQueuedCompletionStatus` observes it on its own
/// thread (spec §4.2.6: "synthesises a close-event with the process exit
/// code as status").
unsafe extern "system" fn exit_callback(context: *mut core::ffi::c_void, timed_out: i32) {
    if timed_out != 0 {
        return;
    }
    // SAFETY: `context` was produced by `Box::into_raw` in `start_process`
    // and this callback is `WT_EXECUTEONLYONCE`, so it runs exactly once.
    let ctx = unsafe { Box::from_raw(context.cast::<ExitContext>()) };
    let mut code: u32 = 0;
    // SAFETY: `ctx.process` is the live handle returned by `CreateProcessA`.
    unsafe {
        windows_sys::Win32::System::Threading::GetExitCodeProcess(ctx.process, &raw mut code);
    }
    ctx.exit_codes
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(ctx.handle, code);
    // SAFETY: `ctx.port` is the backend's completion port, which outlives
    // every process it spawned (the backend only drops after shutdown).
    unsafe {
        PostQueuedCompletionStatus(ctx.port, 0, u64::from(ctx.handle) as usize, std::ptr::null_mut());
    }
}

impl IocpBackend {
    const PIPE_BUFFER_BYTES: u32 = 16 * 1024;

    fn make_inheritable_pipe(tag: &str) -> Result<(HANDLE, HANDLE), ReactorError> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static PIPE_SEQ: AtomicU64 = AtomicU64::new(0);

        let mut inherit = windows_sys::Win32::Security::SECURITY_ATTRIBUTES {
            nLength: u32::try_from(std::mem::size_of::<windows_sys::Win32::Security::SECURITY_ATTRIBUTES>())
                .unwrap_or(0),
            lpSecurityDescriptor: std::ptr::null_mut(),
            bInheritHandle: 1,
        };
        let pid = std::process::id();
        let seq = PIPE_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("\\\\.\\pipe\\moth.{pid}.{tag}.{seq}\0");

        // SAFETY: `name` is a valid, NUL-terminated ASCII string; `inherit`
        // lives for the duration of both calls below.
        let write_end = unsafe {
            windows_sys::Win32::System::Pipes::CreateNamedPipeA(
                name.as_ptr(),
                windows_sys::Win32::Storage::FileSystem::PIPE_ACCESS_OUTBOUND
                    | windows_sys::Win32::Storage::FileSystem::FILE_FLAG_OVERLAPPED,
                windows_sys::Win32::System::Pipes::PIPE_TYPE_BYTE | windows_sys::Win32::System::Pipes::PIPE_WAIT,
                1,
                Self::PIPE_BUFFER_BYTES,
                Self::PIPE_BUFFER_BYTES,
                0,
                &raw mut inherit,
            )
        };
        if write_end == INVALID_HANDLE_VALUE {
            return Err(Self::last_error("CreateNamedPipeA"));
        }
        // SAFETY: `name` and `inherit` are still valid; `write_end`'s server
        // side is already listening for this connection.
        let read_end = unsafe {
            windows_sys::Win32::Storage::FileSystem::CreateFileA(
                name.as_ptr(),
                windows_sys::Win32::Storage::FileSystem::FILE_GENERIC_READ,
                0,
                &raw mut inherit,
                windows_sys::Win32::Storage::FileSystem::OPEN_EXISTING,
                windows_sys::Win32::Storage::FileSystem::FILE_FLAG_OVERLAPPED,
                std::ptr::null_mut(),
            )
        };
        if read_end == INVALID_HANDLE_VALUE {
            return Err(Self::last_error("CreateFileA"));
        }
        Ok((read_end, write_end))
    }

    /// `StartProcess` (spec §4.2.6): spawn `argv[0]` with `argv[1..]`,
    /// redirecting stdin/stdout/stderr through freshly created pipes bound
    /// to this port, inheriting only those three handles into the child.
    /// Registers a one-shot wait that posts a completion on process exit;
    /// the exit code itself is retrieved with [`Self::take_exit_code`]
    /// once that completion's [`ReadinessEvent`] has been observed.
    ///
    /// # Errors
    /// Returns [`ReactorError::Syscall`] if any pipe, attribute-list, or
    /// process-creation call fails.
    pub fn start_process(&mut self, argv: &[String]) -> Result<ProcessHandles, ReactorError> {
        let (stdin_read, stdin_write) = Self::make_inheritable_pipe("stdin")?;
        let (stdout_read, stdout_write) = Self::make_inheritable_pipe("stdout")?;
        let (stderr_read, stderr_write) = Self::make_inheritable_pipe("stderr")?;

        let mut inherited = [stdin_read, stdout_write, stderr_write];
        let mut attr_size: usize = 0;
        // SAFETY: first call with a null list is documented to report the
        // required buffer size via ERROR_INSUFFICIENT_BUFFER.
        unsafe {
            windows_sys::Win32::System::Threading::InitializeProcThreadAttributeList(
                std::ptr::null_mut(),
                1,
                0,
                &raw mut attr_size,
            );
        }
        let mut attr_buffer = vec![0u8; attr_size];
        let attr_list = attr_buffer.as_mut_ptr().cast();
        // SAFETY: `attr_buffer` is sized per the probe call above and kept
        // alive until `DeleteProcThreadAttributeList` below.
        let ok = unsafe {
            windows_sys::Win32::System::Threading::InitializeProcThreadAttributeList(
                attr_list,
                1,
                0,
                &raw mut attr_size,
            )
        };
        if ok == 0 {
            return Err(Self::last_error("InitializeProcThreadAttributeList"));
        }
        // SAFETY: `attr_list` was just initialized; `inherited` outlives
        // this call and the subsequent `CreateProcessA`.
        let ok = unsafe {
            windows_sys::Win32::System::Threading::UpdateProcThreadAttribute(
                attr_list,
                0,
                windows_sys::Win32::System::Threading::PROC_THREAD_ATTRIBUTE_HANDLE_LIST as usize,
                inherited.as_mut_ptr().cast(),
                std::mem::size_of_val(&inherited),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(Self::last_error("UpdateProcThreadAttribute"));
        }

        let mut command_line: Vec<u8> = argv.join(" ").into_bytes();
        command_line.push(0);

        let mut startup_info = windows_sys::Win32::System::Threading::STARTUPINFOEXA {
            StartupInfo: windows_sys::Win32::System::Threading::STARTUPINFOA {
                cb: u32::try_from(std::mem::size_of::<windows_sys::Win32::System::Threading::STARTUPINFOEXA>())
                    .unwrap_or(0),
                hStdInput: stdin_read,
                hStdOutput: stdout_write,
                hStdError: stderr_write,
                dwFlags: windows_sys::Win32::System::Threading::STARTF_USESTDHANDLES,
                ..unsafe { std::mem::zeroed() }
            },
            lpAttributeList: attr_list,
        };
        let mut process_info: windows_sys::Win32::System::Threading::PROCESS_INFORMATION =
            unsafe { std::mem::zeroed() };

        // SAFETY: `command_line` is NUL-terminated and mutable per
        // `CreateProcessA`'s contract; `startup_info`/`process_info` are
        // valid out-parameters for the duration of the call.
        let ok = unsafe {
            windows_sys::Win32::System::Threading::CreateProcessA(
                std::ptr::null(),
                command_line.as_mut_ptr(),
                std::ptr::null(),
                std::ptr::null(),
                1,
                windows_sys::Win32::System::Threading::EXTENDED_STARTUPINFO_PRESENT,
                std::ptr::null(),
                std::ptr::null(),
                &raw mut startup_info.StartupInfo,
                &raw mut process_info,
            )
        };

        // SAFETY: `attr_list` was successfully initialized above.
        unsafe {
            windows_sys::Win32::System::Threading::DeleteProcThreadAttributeList(attr_list);
        }
        // SAFETY: these are the child's ends of each pipe; once inherited
        // by the child process the parent's copies are no longer needed.
        unsafe {
            windows_sys::Win32::Foundation::CloseHandle(stdin_read);
            windows_sys::Win32::Foundation::CloseHandle(stdout_write);
            windows_sys::Win32::Foundation::CloseHandle(stderr_write);
        }
        if ok == 0 {
            return Err(Self::last_error("CreateProcessA"));
        }
        // SAFETY: process_info.hThread is never used past this point.
        unsafe {
            windows_sys::Win32::Foundation::CloseHandle(process_info.hThread);
        }

        let process_handle = self.registered.insert(Entry::Process);
        let ctx = Box::into_raw(Box::new(ExitContext {
            handle: process_handle,
            process: process_info.hProcess,
            port: self.port,
            exit_codes: Arc::clone(&self.exit_codes),
        }));
        let mut wait: HANDLE = std::ptr::null_mut();
        // SAFETY: `process_info.hProcess` stays live until `exit_callback`
        // observes it exit; `ctx` is reclaimed by that same callback.
        let ok = unsafe {
            windows_sys::Win32::System::Threading::RegisterWaitForSingleObject(
                &raw mut wait,
                process_info.hProcess,
                Some(exit_callback),
                ctx.cast::<core::ffi::c_void>(),
                u32::MAX,
                windows_sys::Win32::System::Threading::WT_EXECUTEONLYONCE,
            )
        };
        if ok == 0 {
            // SAFETY: ownership of `ctx` reverts to us since the wait was
            // never actually registered.
            drop(unsafe { Box::from_raw(ctx) });
            return Err(Self::last_error("RegisterWaitForSingleObject"));
        }

        let bind_pipe = |backend: &mut Self, pipe: HANDLE| -> Result<u32, ReactorError> {
            let handle = backend.registered.insert(Entry::Pipe);
            // SAFETY: `pipe` is a freshly created named-pipe handle this
            // process owns; associating it with the port does not take
            // ownership away from the caller.
            let result = unsafe { CreateIoCompletionPort(pipe, backend.port, u64::from(handle) as usize, 0) };
            if result.is_null() {
                return Err(Self::last_error("CreateIoCompletionPort(pipe)"));
            }
            Ok(handle)
        };
        let stdin_handle = bind_pipe(self, stdin_write)?;
        let stdout_handle = bind_pipe(self, stdout_read)?;
        let stderr_handle = bind_pipe(self, stderr_read)?;

        Ok(ProcessHandles {
            process: process_handle,
            stdin: stdin_handle,
            stdout: stdout_handle,
            stderr: stderr_handle,
        })
    }
}

impl ReactorBackend for IocpBackend {
    fn register(&mut self, source: RawSource, interest: Interest) -> Result<u32, ReactorError> {
        let handle = self.registered.insert(Entry::Socket(source, interest));
        // SAFETY: `source` is a socket handle the caller owns; casting it to
        // HANDLE is valid on Windows, where SOCKET and HANDLE share a
        // representation for this API.
        let completion_key = u64::from(handle);
        let result = unsafe { CreateIoCompletionPort(source as HANDLE, self.port, completion_key as usize, 0) };
        if result.is_null() {
            self.registered.remove(handle);
            return Err(Self::last_error("CreateIoCompletionPort(associate)"));
        }
        Ok(handle)
    }

    fn modify(&mut self, handle: u32, interest: Interest) -> Result<(), ReactorError> {
        match self.registered.get_mut(handle) {
            Some(Entry::Socket(_, slot)) => {
                *slot = interest;
                Ok(())
            }
            Some(Entry::Pipe | Entry::Process) | None => Err(ReactorError::NotRegistered { handle }),
        }
    }

    fn deregister(&mut self, handle: u32) -> Result<(), ReactorError> {
        self.registered
            .remove(handle)
            .ok_or(ReactorError::NotRegistered { handle })?;
        Ok(())
    }

    fn poll_once(&mut self, timeout: Option<Duration>) -> Result<Vec<ReadinessEvent>, ReactorError> {
        let timeout_ms = match timeout {
            Some(duration) => u32::try_from(duration.as_millis()).unwrap_or(u32::MAX),
            None => u32::MAX,
        };
        let mut bytes_transferred: u32 = 0;
        let mut completion_key: usize = 0;
        let mut overlapped: *mut OVERLAPPED = std::ptr::null_mut();
        // SAFETY: port is a live completion port; the three output pointers
        // are valid locals, and overlapped is allowed to come back null on
        // timeout.
        let ok = unsafe {
            GetQueuedCompletionStatus(
                self.port,
                &raw mut bytes_transferred,
                &raw mut completion_key,
                &raw mut overlapped,
                timeout_ms,
            )
        };
        if ok == 0 && overlapped.is_null() {
            // Timed out with nothing queued; Windows reports this as
            // failure rather than an empty success like epoll/kqueue.
            return Ok(Vec::new());
        }
        let handle = u32::try_from(completion_key).unwrap_or(u32::MAX);
        let (readable, writable) = match self.registered.get(handle) {
            Some(Entry::Socket(_, interest)) => (interest.readable, interest.writable),
            // A pipe or process completion just means "the submitted
            // overlapped operation finished" or "the child exited"; there
            // is no separate direction to report, so surface it as
            // readable and let the caller look up the exit code (process)
            // or its own overlapped buffer (pipe).
            Some(Entry::Pipe | Entry::Process) | None => (true, false),
        };
        Ok(vec![ReadinessEvent { handle, readable, writable }])
    }
}
