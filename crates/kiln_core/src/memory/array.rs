//! # Flat Arrays
//!
//! Arrays of `Pod` elements stored in one heap allocation.
//!
//! ```text
//! +0  len u32
//! +4  stride_log2 u32
//! +8  element 0, element 1, ...   (stride = next power of two >= size_of T)
//! ```
//!
//! Element `i` lives at `data + (i << stride_log2)`. Index checks are
//! `debug_assert!`s; release builds rely on the buffer's range check.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;

use crate::constants::ARRAY_HEADER;

use super::{Offset, Pointer, SharedBuffer, ThreadHeap};

fn stride_log2<T>() -> u32 {
    let size = u32::try_from(std::mem::size_of::<T>().max(1)).expect("element larger than u32");
    size.next_power_of_two().trailing_zeros()
}

fn data_bytes(count: u32, log2: u32) -> u32 {
    count
        .checked_shl(log2)
        .filter(|b| b >> log2 == count)
        .and_then(|b| b.checked_add(ARRAY_HEADER))
        .expect("array size overflows u32")
}

// =============================================================================
// FIXED
// =============================================================================

/// A fixed-length array.
#[derive(Debug)]
pub struct FixedArray<T> {
    buffer: Arc<SharedBuffer>,
    base: Offset,
    len: u32,
    log2: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> FixedArray<T> {
    /// Allocates `len` zeroed elements.
    ///
    /// # Panics
    ///
    /// Panics if the allocation size overflows `u32`; heap errors are fatal.
    #[must_use]
    pub fn new(heap: &mut ThreadHeap, len: u32) -> Self {
        let log2 = stride_log2::<T>();
        let bytes = data_bytes(len, log2);
        let base = heap.alloc(bytes);
        let buffer = Arc::clone(heap.buffer());
        buffer.fill(base, bytes, 0);
        buffer.write(base, len);
        buffer.write(base.add(4), log2);
        Self {
            buffer,
            base,
            len,
            log2,
            _marker: PhantomData,
        }
    }

    /// Allocates and fills from `values`.
    ///
    /// # Panics
    ///
    /// Panics if `values` has more than `u32::MAX` elements.
    #[must_use]
    pub fn from_slice(heap: &mut ThreadHeap, values: &[T]) -> Self {
        let len = u32::try_from(values.len()).expect("slice too long for a flat array");
        let array = Self::new(heap, len);
        for (i, v) in (0..len).zip(values) {
            array.set(i, *v);
        }
        array
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// True for a zero-length array.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the allocation (header first).
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> Offset {
        self.base
    }

    /// Distance between elements.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> u32 {
        1 << self.log2
    }

    /// Address of element `index`.
    #[inline]
    #[must_use]
    pub fn pointer(&self, index: u32) -> Pointer<T> {
        debug_assert!(index < self.len, "index {index} out of bounds (len {})", self.len);
        Pointer::new(self.base.add(ARRAY_HEADER + (index << self.log2)))
    }

    /// Reads element `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> T {
        self.pointer(index).get(&self.buffer)
    }

    /// Writes element `index`.
    #[inline]
    pub fn set(&self, index: u32, value: T) {
        self.pointer(index).set(&self.buffer, value);
    }

    /// Elements in order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Copies the elements out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Returns the allocation to `heap`.
    pub fn free(self, heap: &mut ThreadHeap) {
        heap.free(self.base);
    }
}

// =============================================================================
// GROWABLE
// =============================================================================

/// A growable array that doubles its allocation when full.
#[derive(Debug)]
pub struct GrowableArray<T> {
    buffer: Arc<SharedBuffer>,
    base: Offset,
    len: u32,
    capacity: u32,
    log2: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> GrowableArray<T> {
    /// Empty array with room for one element.
    #[must_use]
    pub fn new(heap: &mut ThreadHeap) -> Self {
        Self::with_capacity(heap, 1)
    }

    /// Empty array with room for `capacity` elements (at least one).
    #[must_use]
    pub fn with_capacity(heap: &mut ThreadHeap, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        let log2 = stride_log2::<T>();
        let bytes = data_bytes(capacity, log2);
        let base = heap.alloc(bytes);
        let buffer = Arc::clone(heap.buffer());
        buffer.fill(base, bytes, 0);
        buffer.write(base.add(4), log2);
        Self {
            buffer,
            base,
            len: 0,
            capacity,
            log2,
            _marker: PhantomData,
        }
    }

    /// Builds from `values`, sized to fit.
    ///
    /// # Panics
    ///
    /// Panics if `values` has more than `u32::MAX` elements.
    #[must_use]
    pub fn from_slice(heap: &mut ThreadHeap, values: &[T]) -> Self {
        let cap = u32::try_from(values.len()).expect("slice too long for a flat array");
        let mut array = Self::with_capacity(heap, cap);
        for v in values {
            array.push(heap, *v);
        }
        array
    }

    /// Appends `value`, doubling the allocation if the array is full.
    pub fn push(&mut self, heap: &mut ThreadHeap, value: T) {
        if self.len == self.capacity {
            self.grow(heap);
        }
        self.len += 1;
        self.set(self.len - 1, value);
        self.buffer.write(self.base, self.len);
    }

    /// Removes the last element and zeroes its slot.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let ptr = self.pointer(self.len - 1);
        let value = ptr.get(&self.buffer);
        self.buffer.fill(ptr.offset(), self.stride(), 0);
        self.len -= 1;
        self.buffer.write(self.base, self.len);
        Some(value)
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// True when empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements the current allocation holds.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Distance between elements.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> u32 {
        1 << self.log2
    }

    /// Offset of the current allocation. Changes on growth.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> Offset {
        self.base
    }

    /// Address of element `index`. Invalidated by growth.
    #[inline]
    #[must_use]
    pub fn pointer(&self, index: u32) -> Pointer<T> {
        debug_assert!(index < self.len, "index {index} out of bounds (len {})", self.len);
        Pointer::new(self.base.add(ARRAY_HEADER + (index << self.log2)))
    }

    /// Reads element `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: u32) -> T {
        self.pointer(index).get(&self.buffer)
    }

    /// Writes element `index`.
    #[inline]
    pub fn set(&self, index: u32, value: T) {
        self.pointer(index).set(&self.buffer, value);
    }

    /// Elements in order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Copies the elements out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Drops every element, keeping the allocation.
    pub fn clear(&mut self) {
        self.buffer.fill(self.base.add(ARRAY_HEADER), self.len << self.log2, 0);
        self.len = 0;
        self.buffer.write(self.base, 0u32);
    }

    /// Returns the allocation to `heap`.
    pub fn free(self, heap: &mut ThreadHeap) {
        heap.free(self.base);
    }

    fn grow(&mut self, heap: &mut ThreadHeap) {
        let capacity = self.capacity.checked_mul(2).expect("array capacity overflow");
        let bytes = data_bytes(capacity, self.log2);
        let used = self.len << self.log2;

        let base = heap.alloc(bytes);
        self.buffer.copy_within(self.base, base, ARRAY_HEADER + used);
        self.buffer.fill(base.add(ARRAY_HEADER + used), bytes - ARRAY_HEADER - used, 0);
        heap.free(self.base);

        tracing::debug!(from = self.capacity, to = capacity, %base, "growable array moved");
        self.base = base;
        self.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{OverflowAllocator, Region};
    use proptest::prelude::*;

    fn heap() -> ThreadHeap {
        let buffer = Arc::new(SharedBuffer::new(64 + 4096 + 32768));
        let overflow =
            OverflowAllocator::attach(&buffer, &Region::new("overflow", Offset::new(64), 4096, 64), 4096)
                .unwrap();
        ThreadHeap::new(&buffer, &Region::new("heap.0", Offset::new(4160), 32768, 64), overflow)
            .unwrap()
    }

    #[test]
    fn test_stride_is_power_of_two() {
        assert_eq!(stride_log2::<u8>(), 0);
        assert_eq!(stride_log2::<u32>(), 2);
        assert_eq!(stride_log2::<[u8; 3]>(), 2);
        assert_eq!(stride_log2::<[f32; 3]>(), 4);
        assert_eq!(stride_log2::<()>(), 0);
    }

    #[test]
    fn test_fixed_array_get_set() {
        let mut h = heap();
        let a: FixedArray<[f32; 3]> = FixedArray::new(&mut h, 5);
        assert_eq!(a.stride(), 16);
        assert_eq!(a.get(4), [0.0; 3]);
        a.set(2, [1.0, 2.0, 3.0]);
        assert_eq!(a.get(2), [1.0, 2.0, 3.0]);
        assert_eq!(h.buffer().read::<u32>(a.offset()), 5);
        assert_eq!(a.pointer(1).offset(), a.offset().add(8 + 16));
    }

    #[test]
    fn test_fixed_from_slice_and_free() {
        let mut h = heap();
        let a = FixedArray::from_slice(&mut h, &[3u16, 1, 4, 1, 5]);
        assert_eq!(a.to_vec(), vec![3, 1, 4, 1, 5]);
        a.free(&mut h);
        assert_eq!(h.report().used_blocks, 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of bounds")]
    fn test_fixed_index_checked_in_debug() {
        let mut h = heap();
        let a: FixedArray<u32> = FixedArray::new(&mut h, 2);
        let _ = a.get(2);
    }

    #[test]
    fn test_growable_push_pop() {
        let mut h = heap();
        let mut a: GrowableArray<u64> = GrowableArray::new(&mut h);
        assert_eq!(a.pop(), None);
        for v in 0..10u64 {
            a.push(&mut h, v * v);
        }
        assert_eq!(a.capacity(), 16);
        assert_eq!(a.pop(), Some(81));
        assert_eq!(a.len(), 9);
        let slot = a.offset().add(8 + 9 * 8);
        assert_eq!(h.buffer().read::<u64>(slot), 0);
        assert_eq!(a.iter().last(), Some(64));
    }

    #[test]
    fn test_growable_clear_and_free() {
        let mut h = heap();
        let mut a = GrowableArray::from_slice(&mut h, &[1i32, -2, 3]);
        assert_eq!(a.capacity(), 3);
        a.clear();
        assert!(a.is_empty());
        a.push(&mut h, 9);
        assert_eq!(a.to_vec(), vec![9]);
        a.free(&mut h);
        assert_eq!(h.report().used_blocks, 0);
    }

    #[test]
    fn test_growth_frees_old_allocation() {
        let mut h = heap();
        let mut a: GrowableArray<u32> = GrowableArray::new(&mut h);
        for v in 0..100 {
            a.push(&mut h, v);
        }
        assert_eq!(h.report().used_blocks, 1);
    }

    proptest! {
        #[test]
        fn growable_preserves_values_and_doubles_when_full(
            values in prop::collection::vec(any::<i32>(), 1..300)
        ) {
            let mut h = heap();
            let mut a: GrowableArray<i32> = GrowableArray::new(&mut h);
            prop_assert_eq!(a.capacity(), 1);

            for (n, v) in values.iter().enumerate() {
                let (len, cap) = (a.len(), a.capacity());
                a.push(&mut h, *v);
                if len == cap {
                    prop_assert_eq!(a.capacity(), cap * 2);
                } else {
                    prop_assert_eq!(a.capacity(), cap);
                }
                prop_assert_eq!(&a.to_vec()[..], &values[..=n]);
            }
        }
    }
}
