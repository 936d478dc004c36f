//! Test utilities and mock types for silt development.
//!
//! Provides [`MockMemory`], an in-process [`MemoryMap`] double with a
//! configurable fake page size, call counters, scheduled failures, and
//! live-mapping accounting. Tests use it to drive the arena through
//! commit/reserve failures and to prove that every reservation is
//! eventually released.

#![deny(rustdoc::broken_intra_doc_links)]
#![allow(missing_docs)]

use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use silt_vm::{MapError, MemoryMap};

struct Mapping {
    addr: usize,
    size: usize,
    layout: Layout,
    live: bool,
}

#[derive(Default)]
struct Counters {
    reserve: usize,
    commit: usize,
    release: usize,
    reserve_large: usize,
    commit_large: usize,
}

struct Inner {
    mappings: Vec<Mapping>,
    counters: Counters,
    /// Reserve calls with index >= this value fail (counting both variants).
    fail_reserves_after: Option<usize>,
    /// Commit calls with index >= this value fail (counting both variants).
    fail_commits_after: Option<usize>,
}

/// An in-process [`MemoryMap`] double.
///
/// Reservations are heap allocations aligned to the fake page size, so the
/// arena's base-address alignment assumptions hold. The whole allocation is
/// zeroed up front, which matches the contract that freshly backed pages
/// read as zero; commit itself is bookkeeping only.
///
/// Clones share state, so a test can keep a handle for assertions after
/// moving the mock into an arena.
#[derive(Clone)]
pub struct MockMemory {
    inner: Rc<RefCell<Inner>>,
    page_size: usize,
    large_page_size: usize,
}

impl MockMemory {
    /// Create a mock with the given fake page size (power of two).
    ///
    /// The large-page size defaults to 16 regular pages.
    pub fn new(page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());
        Self {
            inner: Rc::new(RefCell::new(Inner {
                mappings: Vec::new(),
                counters: Counters::default(),
                fail_reserves_after: None,
                fail_commits_after: None,
            })),
            page_size,
            large_page_size: page_size * 16,
        }
    }

    /// Make reserve calls fail once `n` calls (across both page sizes)
    /// have already succeeded.
    pub fn fail_reserves_after(&self, n: usize) {
        self.inner.borrow_mut().fail_reserves_after = Some(n);
    }

    /// Make commit calls fail once `n` calls (across both page sizes)
    /// have already succeeded.
    pub fn fail_commits_after(&self, n: usize) {
        self.inner.borrow_mut().fail_commits_after = Some(n);
    }

    /// Number of reservations that have not been released yet.
    pub fn live_mappings(&self) -> usize {
        self.inner
            .borrow()
            .mappings
            .iter()
            .filter(|m| m.live)
            .count()
    }

    pub fn reserve_count(&self) -> usize {
        self.inner.borrow().counters.reserve
    }

    pub fn commit_count(&self) -> usize {
        self.inner.borrow().counters.commit
    }

    pub fn release_count(&self) -> usize {
        self.inner.borrow().counters.release
    }

    pub fn reserve_large_count(&self) -> usize {
        self.inner.borrow().counters.reserve_large
    }

    pub fn commit_large_count(&self) -> usize {
        self.inner.borrow().counters.commit_large
    }

    fn do_reserve(&self, size: usize, granularity: usize, large: bool) -> Result<NonNull<u8>, MapError> {
        let mut inner = self.inner.borrow_mut();

        let attempted = inner.counters.reserve + inner.counters.reserve_large;
        if let Some(limit) = inner.fail_reserves_after {
            if attempted >= limit {
                return Err(MapError::ReserveFailed { size, errno: 0 });
            }
        }

        assert!(size > 0, "zero-sized reservation");
        assert_eq!(size % granularity, 0, "reserve size not page-rounded");

        let layout = Layout::from_size_align(size, granularity).expect("mock mapping layout");
        // SAFETY: layout has nonzero size; checked above.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(MapError::ReserveFailed { size, errno: 0 })?;

        inner.mappings.push(Mapping {
            addr: ptr.as_ptr() as usize,
            size,
            layout,
            live: true,
        });
        if large {
            inner.counters.reserve_large += 1;
        } else {
            inner.counters.reserve += 1;
        }
        Ok(ptr)
    }

    fn do_commit(&self, ptr: NonNull<u8>, size: usize, large: bool) -> Result<(), MapError> {
        let mut inner = self.inner.borrow_mut();

        let attempted = inner.counters.commit + inner.counters.commit_large;
        if let Some(limit) = inner.fail_commits_after {
            if attempted >= limit {
                return Err(MapError::CommitFailed { size, errno: 0 });
            }
        }

        let addr = ptr.as_ptr() as usize;
        let inside = inner
            .mappings
            .iter()
            .any(|m| m.live && addr >= m.addr && addr + size <= m.addr + m.size);
        assert!(inside, "commit of [{addr:#x}, +{size}) outside any live mapping");

        if large {
            inner.counters.commit_large += 1;
        } else {
            inner.counters.commit += 1;
        }
        Ok(())
    }
}

impl MemoryMap for MockMemory {
    fn reserve(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        self.do_reserve(size, self.page_size, false)
    }

    fn commit(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError> {
        self.do_commit(ptr, size, false)
    }

    fn release(&self, ptr: NonNull<u8>, size: usize) {
        let mut inner = self.inner.borrow_mut();
        let addr = ptr.as_ptr() as usize;
        let mapping = inner
            .mappings
            .iter_mut()
            .find(|m| m.live && m.addr == addr)
            .unwrap_or_else(|| panic!("release of unknown mapping {addr:#x}"));
        assert_eq!(mapping.size, size, "release size does not match reservation");
        mapping.live = false;
        let layout = mapping.layout;
        // SAFETY: the pointer came from alloc_zeroed with this layout and
        // the mapping was live until this call.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
        inner.counters.release += 1;
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve_large(&self, size: usize) -> Result<NonNull<u8>, MapError> {
        self.do_reserve(size, self.large_page_size, true)
    }

    fn commit_large(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError> {
        self.do_commit(ptr, size, true)
    }

    fn large_page_size(&self) -> usize {
        self.large_page_size
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for m in &self.mappings {
            if m.live {
                // SAFETY: live mappings still own their allocation.
                unsafe { alloc::dealloc(m.addr as *mut u8, m.layout) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_commit_release_round_trip() {
        let mem = MockMemory::new(4096);
        let base = mem.reserve(8192).unwrap();
        mem.commit(base, 4096).unwrap();
        assert_eq!(mem.live_mappings(), 1);
        mem.release(base, 8192);
        assert_eq!(mem.live_mappings(), 0);
        assert_eq!(mem.reserve_count(), 1);
        assert_eq!(mem.commit_count(), 1);
        assert_eq!(mem.release_count(), 1);
    }

    #[test]
    fn reservations_are_page_aligned_and_zeroed() {
        let mem = MockMemory::new(4096);
        let base = mem.reserve(4096).unwrap();
        assert_eq!(base.as_ptr() as usize % 4096, 0);
        // SAFETY: mock reservations are fully backed.
        let first = unsafe { base.as_ptr().read() };
        assert_eq!(first, 0);
        mem.release(base, 4096);
    }

    #[test]
    fn scheduled_reserve_failure_fires() {
        let mem = MockMemory::new(4096);
        mem.fail_reserves_after(1);
        let base = mem.reserve(4096).unwrap();
        assert!(matches!(
            mem.reserve(4096),
            Err(MapError::ReserveFailed { .. })
        ));
        mem.release(base, 4096);
    }

    #[test]
    fn scheduled_commit_failure_fires() {
        let mem = MockMemory::new(4096);
        mem.fail_commits_after(0);
        let base = mem.reserve(4096).unwrap();
        assert!(matches!(
            mem.commit(base, 4096),
            Err(MapError::CommitFailed { .. })
        ));
        mem.release(base, 4096);
    }

    #[test]
    #[should_panic(expected = "release of unknown mapping")]
    fn double_release_panics() {
        let mem = MockMemory::new(4096);
        let base = mem.reserve(4096).unwrap();
        mem.release(base, 4096);
        mem.release(base, 4096);
    }

    #[test]
    fn large_variants_use_large_granularity() {
        let mem = MockMemory::new(4096);
        let size = mem.large_page_size();
        let base = mem.reserve_large(size).unwrap();
        mem.commit_large(base, size).unwrap();
        assert_eq!(mem.reserve_large_count(), 1);
        assert_eq!(mem.commit_large_count(), 1);
        assert_eq!(mem.reserve_count(), 0);
        mem.release(base, size);
    }
}
