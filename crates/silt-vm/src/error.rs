//! Mapping-layer error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while manipulating virtual-memory mappings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapError {
    /// Reserving an address range failed.
    ReserveFailed {
        /// Number of bytes requested.
        size: usize,
        /// OS error code, or 0 when unavailable.
        errno: i32,
    },
    /// Committing backing storage for a reserved range failed.
    CommitFailed {
        /// Number of bytes requested.
        size: usize,
        /// OS error code, or 0 when unavailable.
        errno: i32,
    },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveFailed { size, errno } => {
                write!(f, "reserving {size} bytes of address space failed (errno {errno})")
            }
            Self::CommitFailed { size, errno } => {
                write!(f, "committing {size} bytes failed (errno {errno})")
            }
        }
    }
}

impl Error for MapError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_size_and_errno() {
        let e = MapError::ReserveFailed {
            size: 4096,
            errno: 12,
        };
        let msg = e.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("12"));
    }
}
