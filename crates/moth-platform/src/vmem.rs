// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Virtual memory mapping facade.
//!
//! Grounded on `original_source/src/vm/virtual_memory.h` and its
//! per-platform `.cc` files: a `VirtualMemory` owns one contiguous, reserved
//! address range and can toggle its protection between read-write and
//! no-access. The heap uses the no-access mode in debug builds to catch
//! stale from-space pointers after a scavenge (spec §4.1.4 step 1).

use crate::PlatformError;
use std::ptr::NonNull;

/// Desired protection for a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Readable and writable.
    ReadWrite,
    /// Mapped but inaccessible; touching it faults.
    NoAccess,
}

/// One contiguous, page-aligned virtual memory reservation.
///
/// Dropping a `VirtualMemory` unmaps the region. The region is never resized
/// in place (the heap's "grow" step allocates a fresh, larger
/// `VirtualMemory` pair and copies into it).
#[derive(Debug)]
pub struct VirtualMemory {
    base: NonNull<u8>,
    len: usize,
    protection: Protection,
}

// SAFETY: `VirtualMemory` owns a private mapping; no aliased mutation is
// possible from other threads unless the owner shares `&mut` access, which
// normal borrowck rules already forbid.
unsafe impl Send for VirtualMemory {}

impl VirtualMemory {
    /// Reserve and commit `len` bytes, read-write, page-aligned.
    ///
    /// # Errors
    /// Returns [`PlatformError::MapFailed`] if the OS mapping call fails
    /// (caller decides whether that is fatal; the heap treats it as fatal
    /// per spec §7).
    pub fn map(len: usize) -> Result<Self, PlatformError> {
        let len = len.max(1);
        let base = platform_map(len)?;
        Ok(Self {
            base,
            len,
            protection: Protection::ReadWrite,
        })
    }

    /// Base address of the mapping.
    #[must_use]
    pub const fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Length of the mapping in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current protection mode.
    #[must_use]
    pub const fn protection(&self) -> Protection {
        self.protection
    }

    /// View the mapping as a byte slice.
    ///
    /// # Panics
    /// Panics if the mapping is currently [`Protection::NoAccess`] — reading
    /// it would fault anyway, so this is caught as an assertion instead of a
    /// segfault wherever debug assertions are enabled.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        debug_assert!(
            self.protection == Protection::ReadWrite,
            "reading a no-access VirtualMemory region"
        );
        // SAFETY: base/len describe a single mapping owned by `self`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// View the mapping as a mutable byte slice.
    ///
    /// # Panics
    /// Panics if the mapping is currently [`Protection::NoAccess`].
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        debug_assert!(
            self.protection == Protection::ReadWrite,
            "writing a no-access VirtualMemory region"
        );
        // SAFETY: base/len describe a single mapping owned by `self`.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Change the protection of the whole region.
    ///
    /// # Errors
    /// Returns [`PlatformError::ProtectFailed`] if the OS call fails.
    pub fn set_protection(&mut self, protection: Protection) -> Result<(), PlatformError> {
        if self.protection == protection {
            return Ok(());
        }
        platform_protect(self.base, self.len, protection)?;
        self.protection = protection;
        Ok(())
    }
}

impl Drop for VirtualMemory {
    fn drop(&mut self) {
        // Best-effort: a failed unmap on drop has nowhere to report to.
        // Grounded on the source treating unmap failure as non-fatal cleanup.
        let _ = platform_unmap(self.base, self.len);
    }
}

#[cfg(unix)]
fn platform_map(len: usize) -> Result<NonNull<u8>, PlatformError> {
    // SAFETY: standard anonymous, private mapping request; errors are checked below.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        // SAFETY: errno() only reads thread-local state.
        let errno = unsafe { *libc::__errno_location() };
        return Err(PlatformError::MapFailed { size: len, errno });
    }
    NonNull::new(ptr.cast::<u8>()).ok_or(PlatformError::MapFailed { size: len, errno: 0 })
}

#[cfg(unix)]
fn platform_protect(
    base: NonNull<u8>,
    len: usize,
    protection: Protection,
) -> Result<(), PlatformError> {
    let prot = match protection {
        Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        Protection::NoAccess => libc::PROT_NONE,
    };
    // SAFETY: base/len describe a mapping previously created by `platform_map`.
    let rc = unsafe { libc::mprotect(base.as_ptr().cast(), len, prot) };
    if rc != 0 {
        // SAFETY: errno() only reads thread-local state.
        let errno = unsafe { *libc::__errno_location() };
        return Err(PlatformError::ProtectFailed {
            addr: base.as_ptr() as usize,
            errno,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn platform_unmap(base: NonNull<u8>, len: usize) -> Result<(), PlatformError> {
    // SAFETY: base/len describe a mapping previously created by `platform_map`.
    let rc = unsafe { libc::munmap(base.as_ptr().cast(), len) };
    if rc != 0 {
        // SAFETY: errno() only reads thread-local state.
        let errno = unsafe { *libc::__errno_location() };
        return Err(PlatformError::UnmapFailed {
            addr: base.as_ptr() as usize,
            errno,
        });
    }
    Ok(())
}

#[cfg(windows)]
fn platform_map(len: usize) -> Result<NonNull<u8>, PlatformError> {
    use windows_sys::Win32::System::Memory::{
        MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE, VirtualAlloc,
    };

    // SAFETY: standard anonymous reservation+commit; error checked below.
    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null(),
            len,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        )
    };
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| PlatformError::MapFailed {
        size: len,
        // SAFETY: GetLastError reads thread-local state.
        errno: unsafe { windows_sys::Win32::Foundation::GetLastError() as i32 },
    })
}

#[cfg(windows)]
fn platform_protect(
    base: NonNull<u8>,
    len: usize,
    protection: Protection,
) -> Result<(), PlatformError> {
    use windows_sys::Win32::System::Memory::{PAGE_NOACCESS, PAGE_READWRITE, VirtualProtect};

    let new_prot = match protection {
        Protection::ReadWrite => PAGE_READWRITE,
        Protection::NoAccess => PAGE_NOACCESS,
    };
    let mut old_prot = 0u32;
    // SAFETY: base/len describe a mapping previously created by `platform_map`.
    let ok = unsafe {
        VirtualProtect(base.as_ptr().cast(), len, new_prot, &raw mut old_prot)
    };
    if ok == 0 {
        return Err(PlatformError::ProtectFailed {
            addr: base.as_ptr() as usize,
            // SAFETY: GetLastError reads thread-local state.
            errno: unsafe { windows_sys::Win32::Foundation::GetLastError() as i32 },
        });
    }
    Ok(())
}

#[cfg(windows)]
fn platform_unmap(base: NonNull<u8>, _len: usize) -> Result<(), PlatformError> {
    use windows_sys::Win32::System::Memory::{MEM_RELEASE, VirtualFree};

    // SAFETY: base describes a mapping previously created by `platform_map`;
    // MEM_RELEASE requires size 0.
    let ok = unsafe { VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE) };
    if ok == 0 {
        return Err(PlatformError::UnmapFailed {
            addr: base.as_ptr() as usize,
            // SAFETY: GetLastError reads thread-local state.
            errno: unsafe { windows_sys::Win32::Foundation::GetLastError() as i32 },
        });
    }
    Ok(())
}
