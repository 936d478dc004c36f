//! Growable bump arena backed by virtual-memory reserve/commit.
//!
//! An [`Arena`] serves subsystems that allocate many short-lived objects
//! with a common lifetime: one pointer bump per request, bulk release via
//! position restore or teardown. Address space is reserved up front and
//! backed by physical pages lazily; when a reservation runs out, a new
//! block is reserved and chained without invalidating prior allocations.
//!
//! The lifecycle per frame of work is:
//! 1. [`Arena::scope`] (or [`Arena::position`]) — capture the cursor
//! 2. [`Arena::push_raw`] / [`Arena::push`] / [`Arena::push_array`] — allocate
//! 3. drop the scope (or [`Arena::pop_to`]) — unwind, releasing spill blocks
//!
//! The arena is single-threaded and performs no internal synchronisation.
//! This crate is one of the silt crates that may contain `unsafe` code
//! (along with `silt-vm`).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod arena;
pub mod config;
pub mod error;
pub mod scope;

mod block;

// Re-export core types at crate root for convenience.
pub use arena::{Arena, PushOptions};
pub use block::BLOCK_HEADER_SIZE;
pub use config::{ArenaConfig, ArenaFlags};
pub use error::ArenaError;
pub use scope::ArenaScope;
