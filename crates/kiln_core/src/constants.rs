//! # Allocator & Synchronization Constants
//!
//! Block geometry shared by every allocator tier.
//!
//! **CRITICAL:** The block layout is the in-buffer format every thread
//! reads. Changing a value here changes the meaning of existing bytes.

// =============================================================================
// ALIGNMENT
// =============================================================================

/// Alignment of every block, payload and arena object (bytes).
pub const ALIGN: u32 = 8;

/// Default alignment of the trailing heap area (one cache line).
pub const HEAP_ALIGN: u32 = 64;

// =============================================================================
// BLOCK GEOMETRY
// =============================================================================

/// Block header: `[size: u32][used: u32]`.
pub const BLOCK_HEADER: u32 = 8;

/// Per-thread heap footer, a mirror of the header.
pub const BLOCK_FOOTER: u32 = 8;

/// Free-list links stored in a free block's payload: `[next: u32][prev: u32]`.
pub const FREE_LINKS: u32 = 8;

/// Smallest block the per-thread heap will carve: header + links + footer.
///
/// A split that would leave a smaller remainder consumes the whole block.
pub const MIN_BLOCK: u32 = BLOCK_HEADER + FREE_LINKS + BLOCK_FOOTER;

/// Overflow region control header: cursor, free head, lock, reserved.
pub const OVERFLOW_HEADER: u32 = 16;

/// Header in front of every flat array allocation.
pub const ARRAY_HEADER: u32 = 8;

/// Used flag value in a block tag.
pub const TAG_USED: u32 = 1;

/// Free flag value in a block tag.
pub const TAG_FREE: u32 = 0;

// =============================================================================
// SYNCHRONIZATION
// =============================================================================

/// CAS attempts before the spin mutex falls back to waiting.
pub const SPIN_LIMIT: u32 = 64;

/// Sync cell value: idle, the coordinator may proceed.
pub const CELL_IDLE: u32 = 0;

/// Sync cell value: render requested / worker busy.
pub const CELL_BUSY: u32 = 1;

/// Rounds `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` on `u32` overflow.
#[inline]
#[must_use]
pub const fn align_up(value: u32, align: u32) -> Option<u32> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Rounds `value` down to a multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_down(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}
