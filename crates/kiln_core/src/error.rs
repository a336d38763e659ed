//! # Core Error Types
//!
//! Every variant here is fatal to the engine. The `try_*` entry points hand
//! the value back so tests can inspect it; the primary `alloc`/`free` paths
//! pass it straight to [`fatal`].

use thiserror::Error;

use crate::memory::Offset;

/// Allocator and container errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Zero-byte allocation request.
    #[error("zero-sized allocation")]
    ZeroSize,

    /// Request above the configured hard cap.
    #[error("allocation of {requested} bytes exceeds the {max} byte cap")]
    TooLarge {
        /// Bytes requested.
        requested: u32,
        /// Configured cap.
        max: u32,
    },

    /// The overflow region cannot satisfy the request.
    #[error("out of memory: requested {requested} bytes, {available} bytes left")]
    OutOfMemory {
        /// Block bytes requested (header included).
        requested: u32,
        /// Bytes left in the region.
        available: u32,
    },

    /// Freed offset belongs to no allocator.
    #[error("free of foreign offset {offset}")]
    InvalidFree {
        /// The offending offset.
        offset: Offset,
    },

    /// Freed block is not marked used.
    #[error("double free at {offset}")]
    DoubleFree {
        /// The offending offset.
        offset: Offset,
    },

    /// Boundary tags disagree or a link points outside the heap.
    #[error("heap corruption at {offset}: {detail}")]
    Corrupt {
        /// Block where the inconsistency was seen.
        offset: Offset,
        /// What was wrong.
        detail: &'static str,
    },

    /// A region cannot host its allocator.
    #[error("region {name} is {size} bytes, needs at least {min}")]
    RegionTooSmall {
        /// Region name.
        name: String,
        /// Region size.
        size: u32,
        /// Minimum size.
        min: u32,
    },
}

/// Region planning errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Alignment is zero or not a power of two.
    #[error("region {name}: alignment {align} is not a power of two")]
    BadAlignment {
        /// Region name.
        name: String,
        /// The rejected alignment.
        align: u32,
    },

    /// A region of zero bytes would share its offset with the next one.
    #[error("region {0} has zero size")]
    EmptyRegion(String),

    /// Two regions share a name.
    #[error("duplicate region name: {0}")]
    DuplicateRegion(String),

    /// The plan does not fit a 32-bit address space.
    #[error("region {0} overflows the 32-bit address space")]
    AddressOverflow(String),
}

/// Result type for allocator operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Halts on an allocator invariant violation.
///
/// Continuing after any [`MemoryError`] would corrupt allocator structures,
/// so the error is logged and the thread panics (abort in release builds).
#[cold]
#[track_caller]
pub fn fatal(err: MemoryError) -> ! {
    tracing::error!(error = %err, "fatal allocator error");
    panic!("fatal allocator error: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = MemoryError::TooLarge {
            requested: 10,
            max: 4,
        };
        assert_eq!(err.to_string(), "allocation of 10 bytes exceeds the 4 byte cap");

        let err = MemoryError::DoubleFree {
            offset: Offset::new(0x40),
        };
        assert_eq!(err.to_string(), "double free at 0x00000040");
    }

    #[test]
    #[should_panic(expected = "zero-sized allocation")]
    fn test_fatal_panics() {
        fatal(MemoryError::ZeroSize);
    }
}
