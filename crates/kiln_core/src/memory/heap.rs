//! # Per-Thread Heap
//!
//! A boundary-tag allocator over one thread's private sub-region. Exactly one
//! thread ever touches it, so nothing here is atomic.
//!
//! ## Block Format
//!
//! ```text
//! +0          size u32   total block bytes, header and footer included
//! +4          used u32
//! +8          payload ...          free blocks: [next u32][prev u32]
//! +size-8     size u32   footer, mirrors the header
//! +size-4     used u32
//! ```
//!
//! Blocks tile the sub-region exactly. Free blocks form a circular doubly
//! linked list threaded through their payloads; no two free blocks are ever
//! physically adjacent.
//!
//! When no free block fits, the request goes to the [`OverflowAllocator`].
//! Callers cannot tell the tiers apart: [`ThreadHeap::free`] routes offsets
//! outside the private range back to the overflow tier.

use std::sync::Arc;

use crate::constants::{
    align_down, align_up, ALIGN, BLOCK_FOOTER, BLOCK_HEADER, MIN_BLOCK, TAG_FREE, TAG_USED,
};
use crate::error::{fatal, MemoryError, MemoryResult};

use super::{Offset, OverflowAllocator, Region, SharedBuffer};

/// Physical walk of a heap, from [`ThreadHeap::verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapReport {
    /// Bytes between the first block and the end of the last one.
    pub capacity: u32,
    /// Bytes in used blocks (tags included).
    pub used_bytes: u32,
    /// Used block count.
    pub used_blocks: u32,
    /// Bytes in free blocks (tags included).
    pub free_bytes: u32,
    /// Free block count.
    pub free_blocks: u32,
    /// Largest free block.
    pub largest_free: u32,
    /// Nodes reachable on the free list.
    pub free_list_len: u32,
    /// Allocations served locally since creation.
    pub local_allocs: u64,
    /// Allocations delegated to the overflow tier.
    pub overflow_allocs: u64,
    /// Frees of local blocks.
    pub local_frees: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    local_allocs: u64,
    overflow_allocs: u64,
    local_frees: u64,
}

/// One thread's allocator.
#[derive(Debug)]
pub struct ThreadHeap {
    buffer: Arc<SharedBuffer>,
    region_size: u32,
    start: Offset,
    end: Offset,
    free_head: Option<Offset>,
    overflow: OverflowAllocator,
    counters: Counters,
}

impl ThreadHeap {
    /// Formats `region` as one free block.
    ///
    /// # Errors
    ///
    /// [`MemoryError::RegionTooSmall`] if the 8-aligned part of the region
    /// cannot hold a minimum block.
    ///
    /// # Panics
    ///
    /// Panics if the region lies outside `buffer` or starts at offset 0.
    pub fn new(
        buffer: &Arc<SharedBuffer>,
        region: &Region,
        overflow: OverflowAllocator,
    ) -> MemoryResult<Self> {
        assert!(!region.offset.is_null(), "heap region at the null offset");
        assert!(region.end().get() <= buffer.len(), "heap region outside buffer");

        let too_small = || MemoryError::RegionTooSmall {
            name: region.name.clone(),
            size: region.size,
            min: MIN_BLOCK,
        };
        let start = align_up(region.offset.get(), ALIGN).ok_or_else(too_small)?;
        let end = align_down(region.end().get(), ALIGN);
        if end < start || end - start < MIN_BLOCK {
            return Err(too_small());
        }

        let mut heap = Self {
            buffer: Arc::clone(buffer),
            region_size: region.size,
            start: Offset::new(start),
            end: Offset::new(end),
            free_head: None,
            overflow,
            counters: Counters::default(),
        };
        heap.write_tags(heap.start, end - start, TAG_FREE);
        heap.push_free(heap.start);

        tracing::debug!(region = %region.name, start = %heap.start, capacity = end - start, "thread heap ready");
        Ok(heap)
    }

    /// Allocates `size` bytes and returns the payload offset (8-aligned).
    ///
    /// # Panics
    ///
    /// Zero-sized requests, requests above the overflow tier's cap and
    /// overflow-tier errors are fatal, whichever tier would serve them.
    #[track_caller]
    pub fn alloc(&mut self, size: u32) -> Offset {
        if size == 0 {
            fatal(MemoryError::ZeroSize);
        }
        let max = self.overflow.max_alloc();
        let need = match block_size_for(size) {
            Some(need) if size <= max => need,
            _ => fatal(MemoryError::TooLarge {
                requested: size,
                max,
            }),
        };

        if let Some(block) = self.find_fit(need) {
            self.counters.local_allocs += 1;
            return self.take(block, need);
        }

        self.counters.overflow_allocs += 1;
        tracing::trace!(size, heap = %self.start, "thread heap full, using overflow");
        self.overflow.alloc(size)
    }

    /// Releases a block from [`Self::alloc`], wherever it came from.
    ///
    /// # Panics
    ///
    /// Foreign offsets, double frees and damaged tags are fatal.
    #[track_caller]
    pub fn free(&mut self, payload: Offset) {
        if let Err(e) = self.try_free(payload) {
            fatal(e);
        }
    }

    /// [`Self::free`] with the error handed back.
    ///
    /// # Errors
    ///
    /// `DoubleFree` for an unused block, `Corrupt` for disagreeing tags, or
    /// the overflow tier's error for offsets outside this heap.
    pub fn try_free(&mut self, payload: Offset) -> MemoryResult<()> {
        if !self.owns(payload) {
            return self.overflow.try_free(payload);
        }

        let mut block = payload.sub(BLOCK_HEADER);
        let (mut size, used) = self.check_tags(block)?;
        if used != TAG_USED {
            return Err(MemoryError::DoubleFree { offset: payload });
        }
        self.counters.local_frees += 1;

        let right = block.add(size);
        if block > self.start {
            let (left_size, left_used) = self.read_tag(block.sub(BLOCK_FOOTER));
            if left_used == TAG_FREE {
                block = block.sub(left_size);
                self.unlink(block);
                size += left_size;
            }
        }
        if right < self.end {
            let (right_size, right_used) = self.read_tag(right);
            if right_used == TAG_FREE {
                self.unlink(right);
                size += right_size;
            }
        }

        self.write_tags(block, size, TAG_FREE);
        self.push_free(block);
        Ok(())
    }

    /// True if `payload` lies in this heap's private range.
    #[must_use]
    pub fn owns(&self, payload: Offset) -> bool {
        (self.start.add(BLOCK_HEADER)..self.end).contains(&payload)
    }

    /// Bytes the blocks tile.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.end.get() - self.start.get()
    }

    /// Region bytes lost to alignment.
    #[must_use]
    pub fn overhead(&self) -> u32 {
        self.region_size - self.capacity()
    }

    /// The buffer this heap allocates in.
    #[must_use]
    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    /// The overflow tier behind this heap.
    #[must_use]
    pub fn overflow(&self) -> &OverflowAllocator {
        &self.overflow
    }

    /// [`Self::verify`], fatal on inconsistency.
    #[must_use]
    pub fn report(&self) -> HeapReport {
        self.verify().unwrap_or_else(|e| fatal(e))
    }

    /// Walks every block and the free list.
    ///
    /// # Errors
    ///
    /// `Corrupt` if tags disagree, blocks do not tile the range, two free
    /// blocks touch, or the free list does not hold exactly the free blocks.
    pub fn verify(&self) -> MemoryResult<HeapReport> {
        let mut report = HeapReport {
            capacity: self.capacity(),
            local_allocs: self.counters.local_allocs,
            overflow_allocs: self.counters.overflow_allocs,
            local_frees: self.counters.local_frees,
            ..HeapReport::default()
        };

        let mut at = self.start;
        let mut prev_free = false;
        while at < self.end {
            let (size, used) = self.check_tags(at)?;
            if used == TAG_USED {
                report.used_bytes += size;
                report.used_blocks += 1;
                prev_free = false;
            } else {
                if prev_free {
                    return Err(MemoryError::Corrupt {
                        offset: at,
                        detail: "adjacent free blocks",
                    });
                }
                report.free_bytes += size;
                report.free_blocks += 1;
                report.largest_free = report.largest_free.max(size);
                prev_free = true;
            }
            at = at.add(size);
        }
        if at != self.end {
            return Err(MemoryError::Corrupt {
                offset: at,
                detail: "blocks overrun the heap",
            });
        }

        if let Some(head) = self.free_head {
            let limit = self.capacity() / MIN_BLOCK + 1;
            let mut node = head;
            loop {
                if self.read_tag(node).1 != TAG_FREE {
                    return Err(MemoryError::Corrupt {
                        offset: node,
                        detail: "used block on the free list",
                    });
                }
                report.free_list_len += 1;
                if report.free_list_len > limit {
                    return Err(MemoryError::Corrupt {
                        offset: node,
                        detail: "free list cycle",
                    });
                }
                let next = self.next(node);
                if self.prev(next) != node {
                    return Err(MemoryError::Corrupt {
                        offset: next,
                        detail: "free list back link",
                    });
                }
                node = next;
                if node == head {
                    break;
                }
            }
        }
        if report.free_list_len != report.free_blocks {
            return Err(MemoryError::Corrupt {
                offset: self.start,
                detail: "free list length mismatch",
            });
        }

        Ok(report)
    }

    fn find_fit(&self, need: u32) -> Option<Offset> {
        let head = self.free_head?;
        let mut node = head;
        loop {
            if self.read_tag(node).0 >= need {
                return Some(node);
            }
            node = self.next(node);
            if node == head {
                return None;
            }
        }
    }

    /// Carves `need` bytes off the front of free `block`.
    fn take(&mut self, block: Offset, need: u32) -> Offset {
        let (size, _) = self.read_tag(block);
        let rest = size - need;

        if rest < MIN_BLOCK {
            self.unlink(block);
            self.write_tags(block, size, TAG_USED);
        } else {
            let remainder = block.add(need);
            self.write_tags(remainder, rest, TAG_FREE);
            self.replace(block, remainder);
            self.write_tags(block, need, TAG_USED);
        }
        block.add(BLOCK_HEADER)
    }

    fn check_tags(&self, block: Offset) -> MemoryResult<(u32, u32)> {
        let (size, used) = self.read_tag(block);
        let room = self.end.get() - block.get();
        if size < MIN_BLOCK || size % ALIGN != 0 || size > room {
            return Err(MemoryError::Corrupt {
                offset: block,
                detail: "block size out of range",
            });
        }
        if self.read_tag(block.add(size - BLOCK_FOOTER)) != (size, used) {
            return Err(MemoryError::Corrupt {
                offset: block,
                detail: "header and footer disagree",
            });
        }
        Ok((size, used))
    }

    // ---------------------------------------------------------------------
    // Tags and links
    // ---------------------------------------------------------------------

    #[inline]
    fn read_tag(&self, at: Offset) -> (u32, u32) {
        (self.buffer.read(at), self.buffer.read(at.add(4)))
    }

    fn write_tags(&self, block: Offset, size: u32, used: u32) {
        let footer = block.add(size - BLOCK_FOOTER);
        for at in [block, footer] {
            self.buffer.write(at, size);
            self.buffer.write(at.add(4), used);
        }
    }

    #[inline]
    fn next(&self, node: Offset) -> Offset {
        Offset::new(self.buffer.read(node.add(BLOCK_HEADER)))
    }

    #[inline]
    fn prev(&self, node: Offset) -> Offset {
        Offset::new(self.buffer.read(node.add(BLOCK_HEADER + 4)))
    }

    #[inline]
    fn set_next(&self, node: Offset, next: Offset) {
        self.buffer.write(node.add(BLOCK_HEADER), next);
    }

    #[inline]
    fn set_prev(&self, node: Offset, prev: Offset) {
        self.buffer.write(node.add(BLOCK_HEADER + 4), prev);
    }

    fn push_free(&mut self, node: Offset) {
        match self.free_head {
            None => {
                self.set_next(node, node);
                self.set_prev(node, node);
            }
            Some(head) => {
                let tail = self.prev(head);
                self.set_next(node, head);
                self.set_prev(node, tail);
                self.set_next(tail, node);
                self.set_prev(head, node);
            }
        }
        self.free_head = Some(node);
    }

    fn unlink(&mut self, node: Offset) {
        let next = self.next(node);
        if next == node {
            self.free_head = None;
            return;
        }
        let prev = self.prev(node);
        self.set_next(prev, next);
        self.set_prev(next, prev);
        if self.free_head == Some(node) {
            self.free_head = Some(next);
        }
    }

    /// Puts `new` where `old` sits in the list.
    fn replace(&mut self, old: Offset, new: Offset) {
        let next = self.next(old);
        if next == old {
            self.set_next(new, new);
            self.set_prev(new, new);
        } else {
            let prev = self.prev(old);
            self.set_next(new, next);
            self.set_prev(new, prev);
            self.set_next(prev, new);
            self.set_prev(next, new);
        }
        if self.free_head == Some(old) {
            self.free_head = Some(new);
        }
    }
}

/// Block bytes for a `size`-byte payload.
#[inline]
fn block_size_for(size: u32) -> Option<u32> {
    let block = align_up(size, ALIGN)?.checked_add(BLOCK_HEADER + BLOCK_FOOTER)?;
    Some(block.max(MIN_BLOCK))
}
