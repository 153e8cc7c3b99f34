// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shared memory: shm_open / ftruncate / mmap / munmap / shm_unlink.
//
// Unlike a ref-counted segment, a region here is never unlinked implicitly:
// it must survive the death of its creator so the surviving endpoint can
// observe the loss. Removal is an explicit policy decision of the caller.

use std::ffi::CString;
use std::io;
use std::ptr;

fn c_name(posix_name: &str) -> io::Result<CString> {
    CString::new(posix_name.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// A mapped, named POSIX shared memory object.
///
/// The file descriptor is closed as soon as the mapping is established; the
/// mapping itself is released on drop. The backing object is left in place.
pub(crate) struct ShmMapping {
    mem: *mut u8,
    size: usize,
    name: String,
}

// Safety: the mapping is shared between processes by design; all
// cross-process fields within it are accessed through atomics.
unsafe impl Send for ShmMapping {}
unsafe impl Sync for ShmMapping {}

impl ShmMapping {
    /// Exclusively create a named object of `size` bytes and map it.
    /// Fails with `EEXIST` if the object already exists.
    pub(crate) fn create(posix_name: &str, size: usize) -> io::Result<Self> {
        let name = c_name(posix_name)?;
        let perms: libc::mode_t = 0o666;

        let fd = unsafe {
            libc::shm_open(
                name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                perms as libc::c_uint,
            )
        };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        // shm_open honors the umask; force the intended permissions.
        unsafe { libc::fchmod(fd, perms) };

        let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            // The half-created object would otherwise shadow future creates.
            unsafe { libc::shm_unlink(name.as_ptr()) };
            return Err(err);
        }

        Self::mmap_and_finish(fd, size, posix_name)
    }

    /// Open and map an existing named object of `size` bytes.
    pub(crate) fn open(posix_name: &str, size: usize) -> io::Result<Self> {
        let name = c_name(posix_name)?;
        let fd = unsafe { libc::shm_open(name.as_ptr(), libc::O_RDWR, 0o666 as libc::c_uint) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Self::mmap_and_finish(fd, size, posix_name)
    }

    fn mmap_and_finish(fd: i32, size: usize, posix_name: &str) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            mem: mem as *mut u8,
            size,
            name: posix_name.to_string(),
        })
    }

    /// Base of the mapping.
    pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// POSIX object name (with leading '/').
    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
    }
}

/// Whether a named object currently exists.
pub(crate) fn exists(posix_name: &str) -> bool {
    let Ok(name) = c_name(posix_name) else {
        return false;
    };
    let fd = unsafe { libc::shm_open(name.as_ptr(), libc::O_RDONLY, 0) };
    if fd == -1 {
        return false;
    }
    unsafe { libc::close(fd) };
    true
}

/// Remove the backing object. Missing objects are not an error.
pub(crate) fn unlink(posix_name: &str) -> io::Result<()> {
    let name = c_name(posix_name)?;
    let ret = unsafe { libc::shm_unlink(name.as_ptr()) };
    if ret == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ENOENT) {
            return Err(err);
        }
    }
    Ok(())
}
