//! # Arena Allocator
//!
//! A slab of equal-sized objects carved from blocks of a [`ThreadHeap`].
//!
//! ## Block Chain
//!
//! ```text
//! block:  [prev block u32][pad u32][obj 0][obj 1] ... [obj n-1]
//! ```
//!
//! Blocks are chained through their first word so the arena needs no host
//! memory to remember them. Freed objects keep the next free object in their
//! first word.

use std::sync::Arc;

use crate::constants::{align_up, ALIGN};
use crate::error::{fatal, MemoryError};

use super::{Offset, SharedBuffer, ThreadHeap};

/// Bytes in front of the objects of every block.
const BLOCK_LINK: u32 = ALIGN;

/// A fixed-object-size allocator.
///
/// Objects are O(1) to allocate and free and are handed out zeroed. Blocks
/// stay with the arena until [`Arena::destroy`].
///
/// # Thread Safety
///
/// Single owner, like the heap it draws from.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = Arena::new(heap.buffer(), 24, 64);
///
/// let node = arena.alloc(&mut heap);
/// arena.free(node);
/// assert_eq!(arena.alloc(&mut heap), node);
///
/// arena.destroy(&mut heap);
/// ```
#[derive(Debug)]
pub struct Arena {
    buffer: Arc<SharedBuffer>,
    /// Object stride (8-aligned).
    object_size: u32,
    /// Objects per block.
    objects_per_block: u32,
    /// Newest block, head of the chain.
    current_block: Offset,
    /// Next unused object in the current block.
    bump: Offset,
    /// Objects left at `bump`.
    remaining: u32,
    /// Most recently freed object.
    free_head: Offset,
    /// Blocks requested so far.
    blocks: u32,
    /// Objects currently handed out.
    live: u32,
}

impl Arena {
    /// Creates an empty arena. No memory is requested until the first
    /// [`Arena::alloc`].
    ///
    /// # Arguments
    ///
    /// * `object_size` - Bytes per object, rounded up to 8
    /// * `objects_per_block` - Objects per heap request
    ///
    /// # Panics
    ///
    /// Panics if `objects_per_block` is zero or a block would not fit `u32`.
    #[must_use]
    pub fn new(buffer: &Arc<SharedBuffer>, object_size: u32, objects_per_block: u32) -> Self {
        assert!(objects_per_block > 0, "arena needs at least one object per block");
        let object_size = align_up(object_size.max(4), ALIGN).expect("arena object size overflow");
        assert!(
            object_size
                .checked_mul(objects_per_block)
                .and_then(|b| b.checked_add(BLOCK_LINK))
                .is_some(),
            "arena block size overflow"
        );

        Self {
            buffer: Arc::clone(buffer),
            object_size,
            objects_per_block,
            current_block: Offset::NULL,
            bump: Offset::NULL,
            remaining: 0,
            free_head: Offset::NULL,
            blocks: 0,
            live: 0,
        }
    }

    /// Returns a zeroed object.
    ///
    /// Reuses the most recently freed object, else bumps inside the current
    /// block, else requests exactly one new block from `heap`.
    pub fn alloc(&mut self, heap: &mut ThreadHeap) -> Offset {
        let obj = if self.free_head.is_null() {
            if self.remaining == 0 {
                self.grow(heap);
            }
            let obj = self.bump;
            self.bump = self.bump.add(self.object_size);
            self.remaining -= 1;
            obj
        } else {
            let obj = self.free_head;
            self.free_head = Offset::new(self.buffer.read(obj));
            obj
        };

        self.buffer.fill(obj, self.object_size, 0);
        self.live += 1;
        obj
    }

    /// Returns `obj` to the arena.
    ///
    /// The memory stays with the arena for the next [`Arena::alloc`].
    ///
    /// # Panics
    ///
    /// Freeing with no objects outstanding, or freeing the object freed
    /// last, is a fatal [`MemoryError::DoubleFree`]. Either would otherwise
    /// link the free list into a cycle.
    #[track_caller]
    pub fn free(&mut self, obj: Offset) {
        debug_assert!(self.owns(obj), "object {obj} is not from this arena");
        if obj == self.free_head {
            fatal(MemoryError::DoubleFree { offset: obj });
        }
        self.live = match self.live.checked_sub(1) {
            Some(live) => live,
            None => fatal(MemoryError::DoubleFree { offset: obj }),
        };
        self.buffer.write(obj, self.free_head);
        self.free_head = obj;
    }

    /// Releases every block to `heap`. Outstanding objects become invalid.
    pub fn destroy(self, heap: &mut ThreadHeap) {
        let mut block = self.current_block;
        while !block.is_null() {
            let prev = Offset::new(self.buffer.read(block));
            heap.free(block);
            block = prev;
        }
        tracing::debug!(blocks = self.blocks, live = self.live, "arena destroyed");
    }

    /// Object stride in bytes.
    #[inline]
    #[must_use]
    pub const fn object_size(&self) -> u32 {
        self.object_size
    }

    /// Blocks requested from the heap so far.
    #[inline]
    #[must_use]
    pub const fn blocks_acquired(&self) -> u32 {
        self.blocks
    }

    /// Objects currently allocated.
    #[inline]
    #[must_use]
    pub const fn live(&self) -> u32 {
        self.live
    }

    /// The buffer the objects live in.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    fn grow(&mut self, heap: &mut ThreadHeap) {
        let bytes = self.object_size * self.objects_per_block + BLOCK_LINK;
        let block = heap.alloc(bytes);
        self.buffer.write(block, self.current_block);
        self.current_block = block;
        self.bump = block.add(BLOCK_LINK);
        self.remaining = self.objects_per_block;
        self.blocks += 1;
        tracing::debug!(%block, bytes, blocks = self.blocks, "arena block acquired");
    }

    fn owns(&self, obj: Offset) -> bool {
        let span = self.object_size * self.objects_per_block;
        let mut block = self.current_block;
        while !block.is_null() {
            let first = block.add(BLOCK_LINK);
            if (first..first.add(span)).contains(&obj)
                && (obj.get() - first.get()) % self.object_size == 0
            {
                return true;
            }
            block = Offset::new(self.buffer.read(block));
        }
        false
    }
}
