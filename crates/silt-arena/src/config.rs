//! Arena configuration parameters.

/// Behaviour flags applied at arena creation.
///
/// Flags are copied into every spill block, so a chained arena behaves
/// uniformly across its blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaFlags {
    /// Back reservations with large pages instead of regular ones.
    pub large_pages: bool,
    /// Forbid spill blocks: the first reservation is the hard capacity
    /// limit and overflowing requests fail instead of chaining.
    pub no_chain: bool,
}

/// Configuration for the arena allocator.
///
/// Controls reservation and commit sizing. Both sizes are rounded up to the
/// applicable page size at construction; all values are immutable after
/// creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Behaviour flags.
    pub flags: ArenaFlags,

    /// Address space reserved per block.
    ///
    /// Default: 64 MiB. Reserved space costs no physical memory until it
    /// is committed, so generous values are cheap.
    pub reserve_size: usize,

    /// Bytes committed up front, and the granularity of lazy commit growth.
    ///
    /// Default: 64 KiB.
    pub commit_size: usize,
}

impl ArenaConfig {
    /// Default reservation size per block: 64 MiB.
    pub const DEFAULT_RESERVE_SIZE: usize = 64 * 1024 * 1024;

    /// Default commit size and commit-growth granularity: 64 KiB.
    pub const DEFAULT_COMMIT_SIZE: usize = 64 * 1024;

    /// Create a config with default sizes and all flags off.
    pub fn new() -> Self {
        Self {
            flags: ArenaFlags::default(),
            reserve_size: Self::DEFAULT_RESERVE_SIZE,
            commit_size: Self::DEFAULT_COMMIT_SIZE,
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new()
    }
}
