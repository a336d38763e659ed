//! # KILN Core
//!
//! Memory management and thread synchronization for a renderer whose threads
//! share one flat, linearly addressed buffer:
//! - No host allocator on the frame path
//! - No thread-safe collections other than what is built here
//! - Only atomic load/store/CAS/wait/notify on 32-bit cells
//!
//! ## Layering
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ FixedArray / GrowableArray      Pool<T> ── Arena (slab)      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ThreadHeap (boundary tags, split/coalesce, one per thread)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ OverflowAllocator (lock-free bump + SpinMutex free list)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ SharedBuffer  ◄── Pointer<T> / Ref<T> / Offset               │
//! └──────────────────────────────────────────────────────────────┘
//!          FrameBarrier (one sync cell per thread, futex wait)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kiln_core::{Offset, OverflowAllocator, Region, SharedBuffer, ThreadHeap};
//!
//! let buffer = Arc::new(SharedBuffer::new(1 << 20));
//! let overflow_region = Region::new("overflow", Offset::new(0x1000), 0x4_0000, 64);
//! let overflow = OverflowAllocator::attach(&buffer, &overflow_region, 0x1_0000)?;
//!
//! let heap_region = Region::new("heap.0", Offset::new(0x4_1000), 0x4_0000, 64);
//! let mut heap = ThreadHeap::new(&buffer, &heap_region, overflow)?;
//!
//! let p = heap.alloc(100);
//! heap.free(p);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod constants;
pub mod error;
pub mod memory;
pub mod sync;

pub use error::{fatal, LayoutError, MemoryError, MemoryResult};
pub use memory::{
    plan_regions, Arena, FixedArray, GrowableArray, HeapReport, Offset, OverflowAllocator,
    OverflowStats, Pointer, Pool, Ref, Region, RegionSpec, RegionTable, SharedBuffer, ThreadHeap,
};
pub use sync::{
    band_for, split_rows, FrameBarrier, RowBand, SpinMutex, SpinMutexGuard, WorkerSignal,
    CONTROL_BYTES,
};
