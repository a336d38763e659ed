//! # Memory Management
//!
//! Everything lives inside one [`SharedBuffer`], addressed by [`Offset`].
//!
//! ## Design Philosophy
//!
//! The buffer is carved once at startup by [`plan_regions`]. After that:
//! - New blocks come from a bump cursor or a free list
//! - Nothing is returned to the host
//! - Each thread allocates from its own [`ThreadHeap`] first and falls back
//!   to the shared [`OverflowAllocator`]

mod arena;
mod array;
mod buffer;
mod heap;
mod overflow;
mod pool;
mod ptr;
mod region;

pub use arena::Arena;
pub use array::{FixedArray, GrowableArray};
pub use buffer::SharedBuffer;
pub use heap::{HeapReport, ThreadHeap};
pub use overflow::{OverflowAllocator, OverflowStats};
pub use pool::Pool;
pub use ptr::{Offset, Pointer, Ref};
pub use region::{plan_regions, Region, RegionSpec, RegionTable};
