//! # Shared Overflow Allocator
//!
//! The tier every thread falls back to when its private heap is full.
//!
//! ## Region Layout
//!
//! ```text
//! base +0   cursor     bytes bumped so far (relative to data)
//! base +4   free head  header offset of the first free block, 0 = empty
//! base +8   lock       SpinMutex cell
//! base +12  reserved
//! base +16  data ...   [size u32][stamp u32][payload ...] blocks
//! ```
//!
//! The stamp of a live block is `LIVE_STAMP` mixed with the block's own
//! header offset and a freed block carries its complement. A payload word
//! pair copied from a real header therefore does not validate anywhere else,
//! and an interior offset is refused instead of joining the free list.
//!
//! All control state is in the buffer, so any thread can attach from the
//! region table alone and a freshly zeroed region is a valid empty allocator.
//!
//! ## Concurrency
//!
//! - New blocks: lock-free CAS on the cursor
//! - Free list: guarded by the in-region [`SpinMutex`]
//!
//! Freed blocks are reused whole and never merged with their neighbours.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::constants::{align_up, ALIGN, BLOCK_HEADER, OVERFLOW_HEADER};
use crate::error::{fatal, MemoryError, MemoryResult};
use crate::sync::SpinMutex;

use super::{Offset, Region, SharedBuffer};

const CURSOR: u32 = 0;
const FREE_HEAD: u32 = 4;
const LOCK: u32 = 8;

/// Smallest block: header plus room for the free-list link.
const MIN_OVERFLOW_BLOCK: u32 = BLOCK_HEADER + ALIGN;

/// Base of the live block stamp.
const LIVE_STAMP: u32 = 0x4B4C_4E00;

#[inline]
const fn live_stamp(header: Offset) -> u32 {
    LIVE_STAMP ^ header.get()
}

#[inline]
const fn free_stamp(header: Offset) -> u32 {
    !live_stamp(header)
}

/// Snapshot of overflow usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverflowStats {
    /// Usable data bytes.
    pub capacity: u32,
    /// Bytes handed out by the bump cursor (headers included).
    pub bumped: u32,
    /// Blocks waiting on the free list.
    pub free_blocks: u32,
    /// Bytes held by those blocks (headers included).
    pub free_bytes: u32,
}

/// A handle onto the overflow region. Cheap to clone; every clone is the
/// same allocator.
#[derive(Debug, Clone)]
pub struct OverflowAllocator {
    buffer: Arc<SharedBuffer>,
    base: Offset,
    data: Offset,
    capacity: u32,
    max_alloc: u32,
}

impl OverflowAllocator {
    /// Attaches to `region`. No formatting is needed on zeroed memory.
    ///
    /// # Errors
    ///
    /// [`MemoryError::RegionTooSmall`] if the region cannot hold the control
    /// header and one minimal block.
    ///
    /// # Panics
    ///
    /// Panics if the region is not 8-aligned or lies outside `buffer`.
    pub fn attach(buffer: &Arc<SharedBuffer>, region: &Region, max_alloc: u32) -> MemoryResult<Self> {
        assert!(
            region.offset.get() % ALIGN == 0 && !region.offset.is_null(),
            "overflow region must be 8-aligned and non-null"
        );
        assert!(region.end().get() <= buffer.len(), "overflow region outside buffer");

        let min = OVERFLOW_HEADER + MIN_OVERFLOW_BLOCK;
        if region.size < min {
            return Err(MemoryError::RegionTooSmall {
                name: region.name.clone(),
                size: region.size,
                min,
            });
        }

        Ok(Self {
            buffer: Arc::clone(buffer),
            base: region.offset,
            data: region.offset.add(OVERFLOW_HEADER),
            capacity: (region.size - OVERFLOW_HEADER) & !(ALIGN - 1),
            max_alloc,
        })
    }

    /// Allocates `size` bytes and returns the payload offset.
    ///
    /// # Panics
    ///
    /// Any [`MemoryError`] is fatal.
    #[track_caller]
    pub fn alloc(&self, size: u32) -> Offset {
        self.try_alloc(size).unwrap_or_else(|e| fatal(e))
    }

    /// Returns a block to the free list.
    ///
    /// # Panics
    ///
    /// Any [`MemoryError`] is fatal.
    #[track_caller]
    pub fn free(&self, payload: Offset) {
        self.try_free(payload).unwrap_or_else(|e| fatal(e));
    }

    /// [`Self::alloc`] with the error handed back.
    ///
    /// # Errors
    ///
    /// `ZeroSize`, `TooLarge` above the cap and `OutOfMemory` when the bump
    /// cursor would pass the end of the region.
    pub fn try_alloc(&self, size: u32) -> MemoryResult<Offset> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        if size > self.max_alloc {
            return Err(MemoryError::TooLarge {
                requested: size,
                max: self.max_alloc,
            });
        }
        let need = align_up(size, ALIGN)
            .and_then(|s| s.checked_add(BLOCK_HEADER))
            .ok_or(MemoryError::TooLarge {
                requested: size,
                max: self.max_alloc,
            })?;

        if let Some(payload) = self.take_free(need) {
            return Ok(payload);
        }
        self.bump(need)
    }

    /// [`Self::free`] with the error handed back.
    ///
    /// # Errors
    ///
    /// `InvalidFree` for an offset outside the bumped range or not at the
    /// start of a block, `DoubleFree` for a block already free, `Corrupt` for
    /// a stamped header with an impossible size.
    pub fn try_free(&self, payload: Offset) -> MemoryResult<()> {
        if !self.contains(payload) {
            return Err(MemoryError::InvalidFree { offset: payload });
        }
        let header = payload.sub(BLOCK_HEADER);

        let _guard = self.lock().lock();
        let stamp: u32 = self.buffer.read(header.add(4));
        if stamp == free_stamp(header) {
            return Err(MemoryError::DoubleFree { offset: payload });
        }
        if stamp != live_stamp(header) {
            return Err(MemoryError::InvalidFree { offset: payload });
        }
        let size: u32 = self.buffer.read(header);
        let end = self.data.get() + self.cursor().load(Ordering::Acquire);
        if size < MIN_OVERFLOW_BLOCK || size % ALIGN != 0 || header.get() + size > end {
            return Err(MemoryError::Corrupt {
                offset: payload,
                detail: "overflow block size out of range",
            });
        }

        self.buffer.write(header.add(4), free_stamp(header));
        let head = self.free_head().load(Ordering::Relaxed);
        self.buffer.write(payload, head);
        self.free_head().store(header.get(), Ordering::Release);
        Ok(())
    }

    /// True if `payload` lies in the bumped range on a block alignment.
    ///
    /// This is a range check only; [`Self::try_free`] also checks the stamp.
    #[must_use]
    pub fn contains(&self, payload: Offset) -> bool {
        let first = self.data.get() + BLOCK_HEADER;
        let end = self.data.get() + self.cursor().load(Ordering::Acquire);
        let at = payload.get();
        (first..end).contains(&at) && (at - self.data.get()) % ALIGN == 0
    }

    /// Walks the free list under the lock.
    #[must_use]
    pub fn stats(&self) -> OverflowStats {
        let _guard = self.lock().lock();
        let mut stats = OverflowStats {
            capacity: self.capacity,
            bumped: self.cursor().load(Ordering::Acquire),
            ..OverflowStats::default()
        };
        let mut node = self.free_head().load(Ordering::Relaxed);
        while node != 0 {
            let header = Offset::new(node);
            stats.free_blocks += 1;
            stats.free_bytes += self.buffer.read::<u32>(header);
            node = self.buffer.read(header.add(BLOCK_HEADER));
        }
        stats
    }

    /// Usable data bytes.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The buffer the region lives in.
    #[must_use]
    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    /// Largest single request accepted.
    #[must_use]
    pub const fn max_alloc(&self) -> u32 {
        self.max_alloc
    }

    /// First-fit scan; unlinks and returns the first block of `need` bytes or
    /// more.
    fn take_free(&self, need: u32) -> Option<Offset> {
        if self.free_head().load(Ordering::Acquire) == 0 {
            return None;
        }

        let _guard = self.lock().lock();
        let mut prev: Option<Offset> = None;
        let mut node = self.free_head().load(Ordering::Relaxed);
        while node != 0 {
            let header = Offset::new(node);
            let payload = header.add(BLOCK_HEADER);
            let next: u32 = self.buffer.read(payload);
            if self.buffer.read::<u32>(header) >= need {
                match prev {
                    None => self.free_head().store(next, Ordering::Relaxed),
                    Some(p) => self.buffer.write(p.add(BLOCK_HEADER), next),
                }
                self.buffer.write(header.add(4), live_stamp(header));
                self.buffer.write(payload, 0u32);
                return Some(payload);
            }
            prev = Some(header);
            node = next;
        }
        None
    }

    fn bump(&self, need: u32) -> MemoryResult<Offset> {
        let cursor = self.cursor();
        let mut old = cursor.load(Ordering::Relaxed);
        loop {
            let new = match old.checked_add(need) {
                Some(n) if n <= self.capacity => n,
                _ => {
                    return Err(MemoryError::OutOfMemory {
                        requested: need,
                        available: self.capacity - old,
                    })
                }
            };
            match cursor.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => break,
                Err(seen) => old = seen,
            }
        }

        let header = self.data.add(old);
        self.buffer.write(header, need);
        self.buffer.write(header.add(4), live_stamp(header));
        Ok(header.add(BLOCK_HEADER))
    }

    #[inline]
    fn cursor(&self) -> &AtomicU32 {
        self.buffer.cell(self.base.add(CURSOR))
    }

    #[inline]
    fn free_head(&self) -> &AtomicU32 {
        self.buffer.cell(self.base.add(FREE_HEAD))
    }

    #[inline]
    fn lock(&self) -> SpinMutex<'_> {
        SpinMutex::new(self.buffer.cell(self.base.add(LOCK)))
    }
}
