//! mmap-backed [`MemoryMap`] implementation for Unix hosts.
//!
//! Reserve is `mmap` with `PROT_NONE` (address space only, no backing),
//! commit is `mprotect` with `PROT_READ | PROT_WRITE`, release is `munmap`.
//! The kernel backs committed pages on first touch and guarantees they read
//! as zero. Large-page reservations add `MAP_HUGETLB` with the 2 MiB size
//! selector on Linux; other Unix hosts fall back to regular pages while
//! keeping the 2 MiB rounding granularity.

use std::io;
use std::ptr::{self, NonNull};

use crate::error::MapError;
use crate::traits::MemoryMap;

// mmap(2) huge page size selectors; not exported by libc on all targets.
#[cfg(target_os = "linux")]
const MAP_HUGE_SHIFT: i32 = 26;
#[cfg(target_os = "linux")]
const MAP_HUGE_2MB: i32 = 21 << MAP_HUGE_SHIFT;

/// Size of the large pages requested by [`OsMemory::reserve_large`].
pub const LARGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Virtual-memory operations backed by the host kernel.
///
/// The regular page size is queried once at construction via
/// `sysconf(_SC_PAGESIZE)`. The type is trivially copyable so callers can
/// embed it by value.
#[derive(Clone, Copy, Debug)]
pub struct OsMemory {
    page_size: usize,
}

impl OsMemory {
    /// Query the host page size and build the mapper.
    pub fn new() -> Self {
        // SAFETY: sysconf has no memory-safety preconditions.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        let page_size = if raw > 0 { raw as usize } else { 4096 };
        Self { page_size }
    }

    fn map(&self, size: usize, extra_flags: libc::c_int) -> Result<NonNull<u8>, MapError> {
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | extra_flags;
        // SAFETY: mmap with a null hint and MAP_ANONYMOUS touches no caller
        // memory; the fd/offset pair is ignored for anonymous mappings.
        let base = unsafe {
            libc::mmap(ptr::null_mut(), size, libc::PROT_NONE, flags, -1, 0)
        };
        if base == libc::MAP_FAILED {
            return Err(MapError::ReserveFailed {
                size,
                errno: last_errno(),
            });
        }
        // mmap never returns null on success.
        NonNull::new(base as *mut u8).ok_or(MapError::ReserveFailed { size, errno: 0 })
    }

    fn protect_rw(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError> {
        // SAFETY: the caller passes a subrange of a mapping previously
        // returned by reserve/reserve_large, aligned to the page size.
        let rc = unsafe {
            libc::mprotect(
                ptr.as_ptr() as *mut libc::c_void,
                size,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            return Err(MapError::CommitFailed {
                size,
                errno: last_errno(),
            });
        }
        Ok(())
    }
}

impl Default for OsMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMap for OsMemory {
    fn reserve(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        #[cfg(target_os = "linux")]
        let flags = libc::MAP_NORESERVE;
        #[cfg(not(target_os = "linux"))]
        let flags = 0;
        self.map(size, flags)
    }

    fn commit(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError> {
        self.protect_rw(ptr, size)
    }

    fn release(&self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: the caller passes a mapping previously returned by
        // reserve/reserve_large together with its full size.
        let rc = unsafe { libc::munmap(ptr.as_ptr() as *mut libc::c_void, size) };
        // Release is infallible from the arena's perspective; a failure here
        // means the caller broke the contract and the range stays mapped.
        debug_assert_eq!(rc, 0, "munmap of {size} bytes failed");
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve_large(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        #[cfg(target_os = "linux")]
        {
            self.map(size, libc::MAP_NORESERVE | libc::MAP_HUGETLB | MAP_HUGE_2MB)
        }
        #[cfg(not(target_os = "linux"))]
        {
            self.map(size, 0)
        }
    }

    fn commit_large(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError> {
        self.protect_rw(ptr, size)
    }

    fn large_page_size(&self) -> usize {
        LARGE_PAGE_SIZE
    }
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        let mem = OsMemory::new();
        assert!(mem.page_size().is_power_of_two());
        assert!(mem.page_size() >= 512);
    }

    #[test]
    fn large_page_size_is_a_multiple_of_page_size() {
        let mem = OsMemory::new();
        assert_eq!(mem.large_page_size() % mem.page_size(), 0);
    }

    #[test]
    fn reserve_returns_page_aligned_base() {
        let mem = OsMemory::new();
        let size = mem.page_size() * 4;
        let base = mem.reserve(size).unwrap();
        assert_eq!(base.as_ptr() as usize % mem.page_size(), 0);
        mem.release(base, size);
    }

    #[test]
    fn committed_pages_are_writable_and_zeroed() {
        let mem = OsMemory::new();
        let size = mem.page_size() * 4;
        let base = mem.reserve(size).unwrap();
        mem.commit(base, mem.page_size()).unwrap();

        // SAFETY: the first page was just committed.
        unsafe {
            assert_eq!(base.as_ptr().read(), 0);
            base.as_ptr().write(0xAB);
            assert_eq!(base.as_ptr().read(), 0xAB);
        }
        mem.release(base, size);
    }

    #[test]
    fn commit_is_idempotent() {
        let mem = OsMemory::new();
        let size = mem.page_size() * 2;
        let base = mem.reserve(size).unwrap();
        mem.commit(base, size).unwrap();

        // SAFETY: the range was committed above.
        unsafe { base.as_ptr().write(0x7F) };

        // Recommitting the same range must succeed and keep the contents.
        mem.commit(base, size).unwrap();
        // SAFETY: still committed.
        unsafe { assert_eq!(base.as_ptr().read(), 0x7F) };
        mem.release(base, size);
    }

    #[test]
    fn reserve_of_many_pages_succeeds_without_backing() {
        // A large reservation must not require physical memory up front.
        let mem = OsMemory::new();
        let size = 1usize << 30;
        let base = mem.reserve(size).unwrap();
        mem.release(base, size);
    }

    #[test]
    #[ignore = "requires a preallocated hugetlb pool"]
    fn large_page_reserve_round_trip() {
        let mem = OsMemory::new();
        let size = mem.large_page_size();
        let base = mem.reserve_large(size).unwrap();
        mem.commit_large(base, size).unwrap();
        // SAFETY: the range was just committed.
        unsafe { base.as_ptr().write(1) };
        mem.release(base, size);
    }
}
