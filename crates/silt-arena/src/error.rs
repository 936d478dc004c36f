//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// Reserving address space or committing backing storage failed.
    OutOfMemory {
        /// Number of bytes the failing platform call asked for.
        requested: usize,
    },
    /// Requested alignment is zero or not a power of two.
    InvalidAlignment {
        /// The rejected alignment.
        alignment: usize,
    },
    /// Chaining is disabled and the current block cannot satisfy the
    /// request.
    CapacityExceeded {
        /// Number of bytes requested.
        requested: usize,
        /// Reserved capacity of the block that rejected the request.
        capacity: usize,
    },
    /// Construction never completed — the supplied backing buffer cannot
    /// even hold the block header.
    NotInitialized,
    /// Internal invariant violated. Reaching this kind signals a bug.
    Failure,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: a platform call for {requested} bytes failed")
            }
            Self::InvalidAlignment { alignment } => {
                write!(f, "invalid alignment: {alignment} is not a power of two")
            }
            Self::CapacityExceeded {
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "arena capacity exceeded: requested {requested} bytes, capacity {capacity} bytes"
                )
            }
            Self::NotInitialized => write!(f, "arena was never initialised"),
            Self::Failure => write!(f, "internal arena invariant violated"),
        }
    }
}

impl Error for ArenaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_request_context() {
        let e = ArenaError::CapacityExceeded {
            requested: 2048,
            capacity: 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }
}
