//! The memory-map contract consumed by the arena core.

use std::ptr::NonNull;

use crate::error::MapError;

/// Two-tier virtual-memory operations: reserve address space, then commit
/// backing storage lazily.
///
/// Implementations map these onto the host's primitives (`mmap`/`mprotect`
/// on Unix, `VirtualAlloc` elsewhere) or onto an in-process double for
/// tests. All methods take `&self`; implementations that track state use
/// interior mutability.
///
/// # Contract
///
/// - [`MemoryMap::reserve`] returns the base of a page-aligned range of
///   `size` bytes with no backing storage. `size` is a multiple of
///   [`MemoryMap::page_size`]. The range must not be touched before it is
///   committed.
/// - [`MemoryMap::commit`] makes `[ptr, ptr + size)` readable and writable.
///   It is idempotent on already-committed pages, and pages backed for the
///   first time read as zero.
/// - [`MemoryMap::release`] unmaps the entire range previously returned by
///   `reserve`. It is infallible from the caller's perspective.
/// - The `_large` variants behave identically with
///   [`MemoryMap::large_page_size`] granularity.
pub trait MemoryMap {
    /// Reserve `size` bytes of address space with no backing storage.
    fn reserve(&self, size: usize) -> Result<NonNull<u8>, MapError>;

    /// Commit backing storage for `[ptr, ptr + size)`.
    fn commit(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError>;

    /// Unmap a range previously returned by [`MemoryMap::reserve`].
    fn release(&self, ptr: NonNull<u8>, size: usize);

    /// Granularity used for rounding reserve and commit sizes.
    fn page_size(&self) -> usize;

    /// Reserve `size` bytes backed by large pages.
    fn reserve_large(&self, size: usize) -> Result<NonNull<u8>, MapError>;

    /// Commit backing storage for a large-page reservation.
    fn commit_large(&self, ptr: NonNull<u8>, size: usize) -> Result<(), MapError>;

    /// Rounding granularity for large-page reservations.
    fn large_page_size(&self) -> usize;
}
