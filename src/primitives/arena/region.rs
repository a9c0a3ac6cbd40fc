#![allow(unsafe_code)]

//! Reserved address ranges with page-granular commit and release.

use std::io;
use std::ptr::{self, NonNull};
use std::slice;

use tracing::warn;

#[cfg(unix)]
use self::unix as sys;
#[cfg(windows)]
use self::windows as sys;
#[cfg(not(any(unix, windows)))]
use self::fallback as sys;

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Returns the OS page size used for commit accounting.
pub(crate) fn page_size() -> usize {
    sys::page_size()
}

/// A contiguous, page-aligned range of reserved virtual memory.
///
/// The region is readable and writable across its whole length on unix;
/// on Windows only committed pages may be touched, so callers must commit
/// before handing out a byte range.
pub(crate) struct Region {
    base: NonNull<u8>,
    len: usize,
}

// The region owns its mapping; shared access only hands out shared slices.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Reserves `len` bytes of address space. `len` must be a page multiple.
    pub(crate) fn reserve(len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot reserve an empty region",
            ));
        }
        let base = sys::reserve(len)?;
        Ok(Self { base, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Makes `[offset, offset + len)` physically backed.
    pub(crate) fn commit(&self, offset: usize, len: usize) -> io::Result<()> {
        self.check_range(offset, len);
        sys::commit(self.base, offset, len)
    }

    /// Hands the physical backing of `[offset, offset + len)` back to the OS.
    /// Contents of the range are unspecified afterwards.
    pub(crate) fn decommit(&self, offset: usize, len: usize) -> io::Result<()> {
        self.check_range(offset, len);
        sys::decommit(self.base, offset, len)
    }

    /// Commits and zero-fills the whole region.
    pub(crate) fn prefault(&mut self) -> io::Result<()> {
        self.commit(0, self.len)?;
        unsafe { ptr::write_bytes(self.base.as_ptr(), 0, self.len) };
        Ok(())
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.check_range(offset, len);
        unsafe { slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    pub(crate) fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.check_range(offset, len);
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
    }

    /// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.check_range(src, len);
        self.check_range(dst, len);
        unsafe {
            ptr::copy(
                self.base.as_ptr().add(src),
                self.base.as_ptr().add(dst),
                len,
            )
        };
    }

    fn check_range(&self, offset: usize, len: usize) {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.len);
        assert!(
            in_bounds,
            "range [{offset}, +{len}) outside region of {} bytes",
            self.len
        );
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if let Err(err) = sys::release(self.base, self.len) {
            warn!(len = self.len, error = %err, "arena.release_region_failed");
        }
    }
}

#[cfg(unix)]
mod unix {
    use super::*;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    pub fn page_size() -> usize {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    }

    pub fn reserve(len: usize) -> io::Result<NonNull<u8>> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                MAP_FLAGS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))
    }

    pub fn commit(base: NonNull<u8>, offset: usize, len: usize) -> io::Result<()> {
        advise(base, offset, len, libc::MADV_WILLNEED)
    }

    pub fn decommit(base: NonNull<u8>, offset: usize, len: usize) -> io::Result<()> {
        advise(base, offset, len, libc::MADV_DONTNEED)
    }

    pub fn release(base: NonNull<u8>, len: usize) -> io::Result<()> {
        let res = unsafe { libc::munmap(base.as_ptr().cast(), len) };
        if res == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn advise(base: NonNull<u8>, offset: usize, len: usize, advice: libc::c_int) -> io::Result<()> {
        let res = unsafe { libc::madvise(base.as_ptr().add(offset).cast(), len, advice) };
        if res == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use std::ffi::c_void;
    use std::mem::zeroed;
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_READWRITE,
    };
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    pub fn page_size() -> usize {
        let size = unsafe {
            let mut info: SYSTEM_INFO = zeroed();
            GetSystemInfo(&mut info);
            info.dwPageSize as usize
        };
        if size > 0 {
            size
        } else {
            FALLBACK_PAGE_SIZE
        }
    }

    pub fn reserve(len: usize) -> io::Result<NonNull<u8>> {
        let ptr = unsafe { VirtualAlloc(ptr::null(), len, MEM_RESERVE, PAGE_READWRITE) };
        NonNull::new(ptr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
    }

    pub fn commit(base: NonNull<u8>, offset: usize, len: usize) -> io::Result<()> {
        let ptr = unsafe {
            VirtualAlloc(
                base.as_ptr().add(offset).cast::<c_void>(),
                len,
                MEM_COMMIT,
                PAGE_READWRITE,
            )
        };
        if ptr.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub fn decommit(base: NonNull<u8>, offset: usize, len: usize) -> io::Result<()> {
        let res = unsafe { VirtualFree(base.as_ptr().add(offset).cast(), len, MEM_DECOMMIT) };
        if res != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub fn release(base: NonNull<u8>, _len: usize) -> io::Result<()> {
        let res = unsafe { VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE) };
        if res != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod fallback {
    use super::*;
    use std::alloc::{alloc_zeroed, dealloc, Layout};

    pub fn page_size() -> usize {
        FALLBACK_PAGE_SIZE
    }

    fn layout(len: usize) -> io::Result<Layout> {
        Layout::from_size_align(len, FALLBACK_PAGE_SIZE)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
    }

    pub fn reserve(len: usize) -> io::Result<NonNull<u8>> {
        let layout = layout(len)?;
        let ptr = unsafe { alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
    }

    pub fn commit(_base: NonNull<u8>, _offset: usize, _len: usize) -> io::Result<()> {
        Ok(())
    }

    pub fn decommit(_base: NonNull<u8>, _offset: usize, _len: usize) -> io::Result<()> {
        Ok(())
    }

    pub fn release(base: NonNull<u8>, len: usize) -> io::Result<()> {
        let layout = layout(len)?;
        unsafe { dealloc(base.as_ptr(), layout) };
        Ok(())
    }
}
