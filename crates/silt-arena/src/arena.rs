//! The arena core: alignment, commit growth, spill, and positional unwind.

use std::mem;
use std::ptr::NonNull;

use tracing::{debug, warn};

use silt_vm::{MemoryMap, OsMemory};

use crate::block::{checked_align_up, rounded_sizes, Block, BLOCK_HEADER_SIZE};
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::scope::ArenaScope;

/// Per-push options for the typed allocation wrappers.
#[derive(Clone, Copy, Debug, Default)]
pub struct PushOptions {
    /// Alignment override. Defaults to the pushed type's alignment.
    pub alignment: Option<usize>,
    /// Zero the returned range. Defaults to false.
    pub zero: bool,
}

/// A growable bump arena over reserved-then-committed virtual memory.
///
/// Allocation is a pointer bump within the tail block of a chain of
/// reservations. When the tail cannot fit a request, a new block is
/// reserved and linked (unless [`ArenaFlags::no_chain`] is set); earlier
/// allocations are never moved or invalidated by growth. Reclamation is
/// positional: [`Arena::pop_to`] rewinds the cursor and releases spill
/// blocks above the target, [`Arena::clear`] rewinds everything.
///
/// # Pointer validity
///
/// A pointer returned by a push is valid for reads and writes of the
/// requested size until a `pop`/`pop_to`/`clear` whose target position is
/// at or below the allocation's position, or until the arena is dropped.
/// Individual deallocation does not exist.
///
/// # Concurrency
///
/// The arena is single-threaded and holds no internal synchronisation;
/// it is neither `Send` nor `Sync`. Callers requiring concurrency wrap it
/// in a mutex or keep one arena per thread.
///
/// [`ArenaFlags::no_chain`]: crate::config::ArenaFlags::no_chain
pub struct Arena<M: MemoryMap = OsMemory> {
    /// Tail block of the chain; earlier blocks hang off `prev`.
    current: Block,
    mem: M,
}

impl Arena<OsMemory> {
    /// Create an arena backed by the host's virtual-memory system.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Self::with_memory(config, OsMemory::new())
    }
}

impl<M: MemoryMap> Arena<M> {
    /// Create an arena over an explicit memory-map implementation.
    ///
    /// Reserves `config.reserve_size` bytes (rounded up to the applicable
    /// page size) and commits the first `config.commit_size` bytes. Any
    /// failure releases the partial reservation and reports out-of-memory.
    pub fn with_memory(config: ArenaConfig, mem: M) -> Result<Self, ArenaError> {
        let current = Block::map(
            &mem,
            config.flags,
            config.reserve_size,
            config.commit_size,
            0,
        )?;
        Ok(Self { current, mem })
    }

    /// Create an arena whose base block is a caller-supplied buffer.
    ///
    /// The buffer is used as-is and treated as fully committed. Spill
    /// blocks (when chaining is allowed) still come from `mem` with the
    /// config's growth sizes. `release_on_drop` decides whether teardown
    /// hands the buffer back to `mem`: leave it false to keep ownership
    /// with the caller.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the
    /// arena's whole lifetime, and nothing else may access the buffer
    /// while the arena lives. With `release_on_drop` set, the buffer must
    /// have been reserved from `mem` with exactly `len` bytes.
    pub unsafe fn with_backing_buffer(
        config: ArenaConfig,
        mem: M,
        ptr: NonNull<u8>,
        len: usize,
        release_on_drop: bool,
    ) -> Result<Self, ArenaError> {
        // SAFETY: forwarded preconditions.
        let mut current = unsafe { Block::from_backing(ptr, len, config.flags, release_on_drop) }?;
        // Spill blocks grow by the configured sizes, not the buffer's.
        let (reserve_size, commit_size) =
            rounded_sizes(&mem, config.flags, config.reserve_size, config.commit_size);
        current.reserve_size = reserve_size;
        current.commit_size = commit_size;
        Ok(Self { current, mem })
    }

    /// Bump-allocate `size` bytes at the given alignment.
    ///
    /// The returned pointer is aligned to `alignment` and its range lies
    /// entirely within committed memory of a single block — allocations
    /// never straddle blocks. With `zero` set the range reads as zero.
    ///
    /// Every successful push strictly advances [`Arena::position`]; a
    /// zero-sized request claims a single byte to keep that guarantee.
    ///
    /// A failed push leaves the arena exactly as it was: the position is
    /// unchanged and a partially created spill block is released.
    pub fn push_raw(
        &mut self,
        size: usize,
        alignment: usize,
        zero: bool,
    ) -> Result<NonNull<u8>, ArenaError> {
        if alignment == 0 || !alignment.is_power_of_two() {
            warn!(alignment, "push rejected: alignment is not a power of two");
            return Err(ArenaError::InvalidAlignment { alignment });
        }

        // The position must strictly increase across successful pushes, so
        // even an empty request claims one byte.
        let size = size.max(1);

        let spilled;
        let (start, end) = match self.fit(size, alignment) {
            Some(range) => {
                spilled = false;
                range
            }
            None => {
                if self.current.flags.no_chain {
                    warn!(
                        requested = size,
                        capacity = self.current.reserved_bytes,
                        "push rejected: chaining disabled and block exhausted"
                    );
                    return Err(ArenaError::CapacityExceeded {
                        requested: size,
                        capacity: self.current.reserved_bytes,
                    });
                }
                spilled = true;
                self.spill(size, alignment)?
            }
        };

        let committed_before = self.current.committed_bytes;
        if end > committed_before {
            self.current.commit_to(&self.mem, end).map_err(|e| {
                warn!(requested = size, "push failed: commit growth refused");
                e
            })?;
        }

        let ptr = self.current.user_ptr(start);
        if zero && !spilled {
            // Pages committed by this call read as zero already; only the
            // previously committed prefix can hold stale bytes. A spill
            // block is entirely fresh, so it needs no scrub at all.
            let zero_end = end.min(committed_before);
            if zero_end > start {
                // SAFETY: [start, zero_end) is committed and exclusively
                // owned by this arena.
                unsafe { ptr.as_ptr().write_bytes(0, zero_end - start) };
            }
        }

        self.current.local_offset = end;
        Ok(ptr)
    }

    /// Bump-allocate one `T`.
    ///
    /// Thin wrapper over [`Arena::push_raw`] with the type's size and
    /// alignment. The pointee is uninitialised unless `options.zero` is
    /// set; see [`Arena`] for pointer validity rules.
    pub fn push<T>(&mut self, options: PushOptions) -> Result<NonNull<T>, ArenaError> {
        let alignment = options.alignment.unwrap_or(mem::align_of::<T>());
        let ptr = self.push_raw(mem::size_of::<T>(), alignment, options.zero)?;
        Ok(ptr.cast())
    }

    /// Bump-allocate a contiguous range of `count` values of `T`.
    ///
    /// The multiplied size overflowing a machine word is unreachable for
    /// practical inputs and surfaces as [`ArenaError::Failure`].
    pub fn push_array<T>(
        &mut self,
        count: usize,
        options: PushOptions,
    ) -> Result<NonNull<[T]>, ArenaError> {
        let size = mem::size_of::<T>()
            .checked_mul(count)
            .ok_or(ArenaError::Failure)?;
        let alignment = options.alignment.unwrap_or(mem::align_of::<T>());
        let ptr = self.push_raw(size, alignment, options.zero)?;
        Ok(NonNull::slice_from_raw_parts(ptr.cast::<T>(), count))
    }

    /// Current cursor as a chain-wide byte position.
    ///
    /// Monotonically non-decreasing between pops; a fresh arena reports
    /// [`BLOCK_HEADER_SIZE`]. Feed the value back to [`Arena::pop_to`] to
    /// unwind everything allocated after the query.
    pub fn position(&self) -> u64 {
        self.current.global_offset + self.current.local_offset as u64
    }

    /// Rewind the cursor to `target`, releasing spill blocks above it.
    ///
    /// The target is clamped to [`BLOCK_HEADER_SIZE`], so popping past the
    /// base block rewinds to an empty arena instead of crashing. Targets
    /// beyond the current position are a caller bug: debug builds assert,
    /// release builds clamp to the current position.
    pub fn pop_to(&mut self, target: u64) {
        let mut target = target.max(BLOCK_HEADER_SIZE as u64);
        let position = self.position();
        if target > position {
            debug_assert!(false, "pop target {target} is past position {position}");
            warn!(
                requested = target,
                position, "pop target clamped to the current position"
            );
            target = position;
        }

        while self.current.global_offset >= target {
            // The base block sits at global offset 0 and the target is at
            // least BLOCK_HEADER_SIZE, so the walk stops before the base.
            let Some(prev) = self.current.prev.take() else {
                debug_assert!(false, "unwind walked past the base block");
                break;
            };
            let mut released = mem::replace(&mut self.current, *prev);
            released.release_mapping(&self.mem);
        }

        let local = (target - self.current.global_offset) as usize;
        self.current.local_offset = local.max(BLOCK_HEADER_SIZE);
    }

    /// Rewind the cursor by `amount` bytes.
    ///
    /// Popping more than is currently allocated clamps at the base of the
    /// root block.
    pub fn pop(&mut self, amount: u64) {
        let target = self.position().saturating_sub(amount);
        self.pop_to(target);
    }

    /// Release every spill block and rewind the root block's cursor.
    ///
    /// The root block's committed pages are retained, so subsequent
    /// allocations reuse them without new platform calls.
    pub fn clear(&mut self) {
        self.pop_to(0);
    }

    /// Capture the current position in a guard that restores it on drop.
    ///
    /// Scopes nest arbitrarily; each guard unwinds to exactly its own
    /// capture point, releasing any spill blocks created inside it.
    pub fn scope(&mut self) -> ArenaScope<'_, M> {
        ArenaScope::new(self)
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        let mut count = 1;
        let mut block = &self.current;
        while let Some(prev) = &block.prev {
            block = prev;
            count += 1;
        }
        count
    }

    /// Committed bytes of the tail block.
    pub fn committed_bytes(&self) -> usize {
        self.current.committed_bytes
    }

    /// Reserved bytes of the tail block.
    pub fn reserved_bytes(&self) -> usize {
        self.current.reserved_bytes
    }

    /// Address space reserved across the whole chain.
    pub fn total_reserved_bytes(&self) -> u64 {
        self.current.global_offset + self.current.reserved_bytes as u64
    }

    /// Compute the aligned range a request would occupy in the tail block,
    /// or `None` when it does not fit the reservation.
    fn fit(&self, size: usize, alignment: usize) -> Option<(usize, usize)> {
        let base = self.current.base_addr();
        // Align the absolute address, not the offset: the base is only
        // page-aligned, and alignments above the page size must still hold.
        let unaligned = base + self.current.local_offset;
        let start_addr = unaligned.checked_add(alignment - 1)? & !(alignment - 1);
        let start = start_addr - base;
        let end = start.checked_add(size)?;
        (end <= self.current.reserved_bytes).then_some((start, end))
    }

    /// Reserve a spill block sized for the request, commit what the
    /// allocation needs, and link it as the new tail.
    ///
    /// Nothing is linked until every fallible step has succeeded, so a
    /// failure leaves the chain in its pre-spill state.
    fn spill(&mut self, size: usize, alignment: usize) -> Result<(usize, usize), ArenaError> {
        let page = if self.current.flags.large_pages {
            self.mem.large_page_size()
        } else {
            self.mem.page_size()
        };

        // The block must hold the header plus the request, aligned as a sum.
        let required = size
            .checked_add(BLOCK_HEADER_SIZE)
            .and_then(|sum| checked_align_up(sum, alignment))
            .ok_or(ArenaError::OutOfMemory { requested: size })?;

        let (reserve_request, commit_request) = if required > self.current.reserve_size {
            // A single oversized request gets a dedicated block sized for
            // it, additionally rounded to the page size so the platform
            // contract holds for sub-page alignments.
            let grown = checked_align_up(required, alignment.max(page))
                .ok_or(ArenaError::OutOfMemory { requested: size })?;
            (grown, grown)
        } else {
            (self.current.reserve_size, self.current.commit_size)
        };

        let global_offset = self
            .current
            .global_offset
            .checked_add(self.current.reserved_bytes as u64)
            .ok_or(ArenaError::Failure)?;

        let mut block = Block::map(
            &self.mem,
            self.current.flags,
            reserve_request,
            commit_request,
            global_offset,
        )
        .map_err(|e| {
            warn!(requested = size, "push failed: spill block reservation refused");
            e
        })?;
        block.reserve_size = self.current.reserve_size;
        block.commit_size = self.current.commit_size;

        // Recompute the fit inside the fresh block.
        let base = block.base_addr();
        let unaligned = base + block.local_offset;
        let start_addr = match unaligned.checked_add(alignment - 1) {
            Some(v) => v & !(alignment - 1),
            None => {
                block.release_mapping(&self.mem);
                return Err(ArenaError::Failure);
            }
        };
        let start = start_addr - base;
        let end = match start.checked_add(size) {
            Some(end) if end <= block.reserved_bytes => end,
            _ => {
                block.release_mapping(&self.mem);
                return Err(ArenaError::Failure);
            }
        };

        if end > block.committed_bytes {
            if let Err(e) = block.commit_to(&self.mem, end) {
                block.release_mapping(&self.mem);
                warn!(requested = size, "push failed: spill block commit refused");
                return Err(e);
            }
        }

        debug!(
            reserved = block.reserved_bytes,
            committed = block.committed_bytes,
            global_offset,
            "reserved spill block"
        );

        let old = mem::replace(&mut self.current, block);
        self.current.prev = Some(Box::new(old));
        Ok((start, end))
    }
}

impl<M: MemoryMap> Drop for Arena<M> {
    fn drop(&mut self) {
        let mut prev = self.current.prev.take();
        while let Some(mut block) = prev {
            prev = block.prev.take();
            block.release_mapping(&self.mem);
        }
        self.current.release_mapping(&self.mem);
    }
}
