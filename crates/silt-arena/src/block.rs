//! Reserved virtual-memory blocks.
//!
//! A [`Block`] is one contiguous reservation: a page-rounded address range
//! whose committed prefix grows lazily. Blocks form a singly linked chain
//! through `prev`; the arena owns the tail and walks backward to unwind.
//! The first [`BLOCK_HEADER_SIZE`] bytes of every reservation are skipped
//! and never handed out, so positions across the chain are stable offsets.

use std::ptr::NonNull;

use silt_vm::MemoryMap;

use crate::config::ArenaFlags;
use crate::error::ArenaError;

/// Bytes at the base of every block that are never allocated from.
///
/// A fresh block's cursor starts here, so the minimum position of any
/// arena is `BLOCK_HEADER_SIZE`.
pub const BLOCK_HEADER_SIZE: usize = 128;

/// One contiguous reservation plus its bookkeeping.
///
/// Field invariants, upheld by every mutation:
/// `BLOCK_HEADER_SIZE <= local_offset` and
/// `committed_bytes <= reserved_bytes`, with both byte counts multiples of
/// the applicable page size.
pub(crate) struct Block {
    /// Base of the reservation.
    base: NonNull<u8>,
    /// Total address space reserved.
    pub(crate) reserved_bytes: usize,
    /// Prefix of the reservation currently backed by physical pages.
    pub(crate) committed_bytes: usize,
    /// First free byte, measured from `base`.
    pub(crate) local_offset: usize,
    /// Sum of `reserved_bytes` of all earlier blocks in the chain.
    pub(crate) global_offset: u64,
    /// Reservation size inherited by spill blocks.
    pub(crate) reserve_size: usize,
    /// Commit size and commit-growth granularity inherited by spill blocks.
    pub(crate) commit_size: usize,
    /// Creation flags, copied to spill blocks.
    pub(crate) flags: ArenaFlags,
    /// Whether teardown unmaps this block. False only for caller-supplied
    /// backing buffers whose ownership stays with the caller.
    release_on_drop: bool,
    /// Previous block in the chain, or none for the base block.
    pub(crate) prev: Option<Box<Block>>,
}

impl Block {
    /// Reserve a fresh block and commit its initial prefix.
    ///
    /// `reserve_request` and `commit_request` are rounded up to the
    /// applicable page size (regular or large per `flags`). A failed
    /// initial commit releases the reservation before reporting
    /// out-of-memory, so a failed mapping leaks nothing.
    pub(crate) fn map<M: MemoryMap>(
        mem: &M,
        flags: ArenaFlags,
        reserve_request: usize,
        commit_request: usize,
        global_offset: u64,
    ) -> Result<Block, ArenaError> {
        let (reserved, committed) = rounded_sizes(mem, flags, reserve_request, commit_request);

        let reserve_result = if flags.large_pages {
            mem.reserve_large(reserved)
        } else {
            mem.reserve(reserved)
        };
        let base = reserve_result.map_err(|_| ArenaError::OutOfMemory {
            requested: reserved,
        })?;

        let commit_result = if flags.large_pages {
            mem.commit_large(base, committed)
        } else {
            mem.commit(base, committed)
        };
        if commit_result.is_err() {
            mem.release(base, reserved);
            return Err(ArenaError::OutOfMemory {
                requested: committed,
            });
        }

        Ok(Block {
            base,
            reserved_bytes: reserved,
            committed_bytes: committed,
            local_offset: BLOCK_HEADER_SIZE,
            global_offset,
            reserve_size: reserved,
            commit_size: committed,
            flags,
            release_on_drop: true,
            prev: None,
        })
    }

    /// Build the base block over a caller-supplied buffer.
    ///
    /// The buffer is used as-is: fully committed, no page rounding. A
    /// buffer that cannot hold the header fails with
    /// [`ArenaError::NotInitialized`].
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes and
    /// exclusively owned by the block for its lifetime. When
    /// `release_on_drop` is set, the buffer must have come from the same
    /// memory map the arena uses, reserved with exactly `len` bytes.
    pub(crate) unsafe fn from_backing(
        ptr: NonNull<u8>,
        len: usize,
        flags: ArenaFlags,
        release_on_drop: bool,
    ) -> Result<Block, ArenaError> {
        if len <= BLOCK_HEADER_SIZE {
            return Err(ArenaError::NotInitialized);
        }
        Ok(Block {
            base: ptr,
            reserved_bytes: len,
            committed_bytes: len,
            local_offset: BLOCK_HEADER_SIZE,
            global_offset: 0,
            reserve_size: len,
            commit_size: len,
            flags,
            release_on_drop,
            prev: None,
        })
    }

    /// Grow the committed prefix so that `[0, end)` is backed.
    ///
    /// The commit target is `end` rounded up to the commit granularity and
    /// clamped to the reservation. No-op when `end` is already committed.
    pub(crate) fn commit_to<M: MemoryMap>(
        &mut self,
        mem: &M,
        end: usize,
    ) -> Result<(), ArenaError> {
        if end <= self.committed_bytes {
            return Ok(());
        }
        debug_assert!(end <= self.reserved_bytes);

        let target = align_up(end, self.commit_size).min(self.reserved_bytes);
        let delta = target - self.committed_bytes;
        // SAFETY: committed_bytes <= reserved_bytes, so the offset stays
        // inside the reservation.
        let at = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.committed_bytes)) };
        let result = if self.flags.large_pages {
            mem.commit_large(at, delta)
        } else {
            mem.commit(at, delta)
        };
        result.map_err(|_| ArenaError::OutOfMemory { requested: delta })?;
        self.committed_bytes = target;
        Ok(())
    }

    /// Unmap the reservation, unless ownership stays with the caller.
    /// Idempotent so error unwind and teardown cannot double-release.
    pub(crate) fn release_mapping<M: MemoryMap>(&mut self, mem: &M) {
        if self.release_on_drop {
            mem.release(self.base, self.reserved_bytes);
            self.release_on_drop = false;
        }
    }

    /// Base address of the reservation.
    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Pointer to the byte at `offset` from the base.
    pub(crate) fn user_ptr(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset >= BLOCK_HEADER_SIZE);
        debug_assert!(offset <= self.reserved_bytes);
        // SAFETY: offset is within the reservation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }
}

/// Round reserve/commit requests up to the applicable page size.
///
/// The granularity is raised to [`BLOCK_HEADER_SIZE`] if the page size is
/// smaller, so every block can hold its header; the commit size is clamped
/// to the reservation.
pub(crate) fn rounded_sizes<M: MemoryMap>(
    mem: &M,
    flags: ArenaFlags,
    reserve_request: usize,
    commit_request: usize,
) -> (usize, usize) {
    let page = if flags.large_pages {
        mem.large_page_size()
    } else {
        mem.page_size()
    };
    let granularity = page.max(BLOCK_HEADER_SIZE);
    let reserved = align_up(reserve_request, granularity).max(granularity);
    let committed = align_up(commit_request, granularity)
        .max(granularity)
        .min(reserved);
    (reserved, committed)
}

/// Round `value` up to the next multiple of `align`.
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}

/// Round `value` up to the next multiple of `align`, or `None` when the
/// result does not fit a machine word.
pub(crate) fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align > 0);
    value.div_ceil(align).checked_mul(align)
}

#[cfg(test)]
mod tests {
    use silt_vm::OsMemory;

    use super::*;

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
        assert_eq!(align_up(0, 4096), 0);
        assert_eq!(align_up(4097, 4096), 8192);
        // Non-power-of-two granularity (rounded commit sizes can be one).
        assert_eq!(align_up(10, 24), 24);
        assert_eq!(align_up(25, 24), 48);
    }

    #[test]
    fn checked_align_up_detects_overflow() {
        assert_eq!(checked_align_up(9, 8), Some(16));
        assert_eq!(checked_align_up(usize::MAX - 1, 4096), None);
    }

    #[test]
    fn map_rounds_sizes_to_page_multiples() {
        let mem = OsMemory::new();
        let mut block = Block::map(&mem, ArenaFlags::default(), 100_000, 10_000, 0).unwrap();
        assert_eq!(block.reserved_bytes % mem.page_size(), 0);
        assert_eq!(block.committed_bytes % mem.page_size(), 0);
        assert!(block.reserved_bytes >= 100_000);
        assert!(block.committed_bytes >= 10_000);
        assert!(block.committed_bytes <= block.reserved_bytes);
        block.release_mapping(&mem);
    }

    #[test]
    fn fresh_block_cursor_starts_past_the_header() {
        let mem = OsMemory::new();
        let mut block = Block::map(&mem, ArenaFlags::default(), 1 << 20, 1 << 16, 0).unwrap();
        assert_eq!(block.local_offset, BLOCK_HEADER_SIZE);
        assert_eq!(block.global_offset, 0);
        block.release_mapping(&mem);
    }

    #[test]
    fn commit_to_grows_by_granularity_and_clamps() {
        let mem = OsMemory::new();
        let mut block = Block::map(&mem, ArenaFlags::default(), 1 << 20, 1 << 16, 0).unwrap();
        let commit_size = block.commit_size;

        block.commit_to(&mem, (1 << 16) + 1).unwrap();
        assert_eq!(block.committed_bytes, 2 * commit_size);

        // Committing right up to the end clamps at the reservation.
        block.commit_to(&mem, block.reserved_bytes - 1).unwrap();
        assert_eq!(block.committed_bytes, block.reserved_bytes);
        block.release_mapping(&mem);
    }

    #[test]
    fn commit_to_is_a_noop_below_the_watermark() {
        let mem = OsMemory::new();
        let mut block = Block::map(&mem, ArenaFlags::default(), 1 << 20, 1 << 16, 0).unwrap();
        let before = block.committed_bytes;
        block.commit_to(&mem, 1).unwrap();
        assert_eq!(block.committed_bytes, before);
        block.release_mapping(&mem);
    }

    #[test]
    fn backing_buffer_too_small_for_header_is_rejected() {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        // SAFETY: the buffer outlives the call and nothing else touches it.
        let result = unsafe { Block::from_backing(ptr, buf.len(), ArenaFlags::default(), false) };
        assert!(matches!(result, Err(ArenaError::NotInitialized)));
    }

    #[test]
    fn backing_buffer_is_fully_committed() {
        let mut buf = vec![0u8; 4096];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        // SAFETY: the buffer outlives the block and nothing else touches it.
        let block = unsafe { Block::from_backing(ptr, buf.len(), ArenaFlags::default(), false) }
            .unwrap();
        assert_eq!(block.committed_bytes, 4096);
        assert_eq!(block.reserved_bytes, 4096);
        assert_eq!(block.local_offset, BLOCK_HEADER_SIZE);
    }
}
