//! # Typed Pool
//!
//! Fixed-size slots for `Pod` values, backed by an [`Arena`].

use std::marker::PhantomData;

use bytemuck::Pod;

use super::{Arena, Pointer, ThreadHeap};

/// A pool of `T` slots in the shared buffer.
///
/// The usual payload is a small record or a [`super::Ref`] that has to live
/// in memory so other structures can point at it.
///
/// # Thread Safety
///
/// Single owner. The values themselves are plain bytes any thread can read
/// once handed over.
///
/// # Example
///
/// ```rust,ignore
/// let mut refs: Pool<Ref<Glyph>> = Pool::new(&heap, 64);
///
/// let slot = refs.insert(&mut heap, Ref::to(glyph));
/// let glyph = refs.get(slot).get(heap.buffer());
/// refs.remove(slot);
/// ```
#[derive(Debug)]
pub struct Pool<T> {
    arena: Arena,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> Pool<T> {
    /// Creates an empty pool drawing blocks of `slots_per_block` from `heap`.
    ///
    /// # Panics
    ///
    /// Panics if `slots_per_block` is zero.
    #[must_use]
    pub fn new(heap: &ThreadHeap, slots_per_block: u32) -> Self {
        let size = u32::try_from(std::mem::size_of::<T>()).expect("pool slot larger than u32");
        Self {
            arena: Arena::new(heap.buffer(), size, slots_per_block),
            _marker: PhantomData,
        }
    }

    /// Stores `value` in a fresh slot.
    pub fn insert(&mut self, heap: &mut ThreadHeap, value: T) -> Pointer<T> {
        let slot = Pointer::new(self.arena.alloc(heap));
        slot.set(self.arena.buffer(), value);
        slot
    }

    /// Reads a slot.
    #[must_use]
    pub fn get(&self, slot: Pointer<T>) -> T {
        slot.get(self.arena.buffer())
    }

    /// Overwrites a slot.
    pub fn set(&self, slot: Pointer<T>, value: T) {
        slot.set(self.arena.buffer(), value);
    }

    /// Frees a slot and returns its last value.
    pub fn remove(&mut self, slot: Pointer<T>) -> T {
        let value = self.get(slot);
        self.arena.free(slot.offset());
        value
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.arena.live()
    }

    /// True if no slot is occupied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.arena.live() == 0
    }

    /// Releases all memory to `heap`.
    pub fn destroy(self, heap: &mut ThreadHeap) {
        self.arena.destroy(heap);
    }
}
