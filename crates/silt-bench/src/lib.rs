//! Shared constructors for the silt benchmark suite.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use silt_arena::{Arena, ArenaConfig, ArenaFlags};

/// Build an arena with the given reservation and commit sizes.
///
/// # Panics
///
/// Panics if the host refuses the reservation.
pub fn make_arena(reserve_size: usize, commit_size: usize) -> Arena {
    Arena::new(ArenaConfig {
        flags: ArenaFlags::default(),
        reserve_size,
        commit_size,
    })
    .expect("arena reservation")
}

/// Build an arena with the default 64 MiB / 64 KiB sizing.
///
/// # Panics
///
/// Panics if the host refuses the reservation.
pub fn make_default_arena() -> Arena {
    Arena::new(ArenaConfig::new()).expect("arena reservation")
}
