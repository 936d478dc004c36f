//! Platform virtual-memory primitives for the silt workspace.
//!
//! This is the leaf crate with zero internal silt dependencies. It defines
//! the [`MemoryMap`] trait — the reserve/commit/release contract the arena
//! core consumes — and [`OsMemory`], the mmap-backed implementation for
//! Unix hosts. This crate is one of the silt crates that may contain
//! `unsafe` code (along with `silt-arena`).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod os;

// Re-export core types at crate root for convenience.
pub use error::MapError;
pub use traits::MemoryMap;

#[cfg(unix)]
pub use os::OsMemory;
