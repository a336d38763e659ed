//! # Offsets, Pointers and References
//!
//! Every "pointer" in the engine is a `u32` offset into the [`SharedBuffer`].
//! None of these types own anything; they are `Copy` and `Send` and can be
//! stored inside the buffer itself.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};

use super::SharedBuffer;

/// An address inside the shared buffer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Offset(u32);

impl Offset {
    /// The null offset. No allocator ever returns it.
    pub const NULL: Self = Self(0);

    /// Wraps a raw byte offset.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw byte offset.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns true for [`Offset::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Offset `bytes` further on.
    ///
    /// # Panics
    ///
    /// Panics on `u32` overflow.
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn add(self, bytes: u32) -> Self {
        match self.0.checked_add(bytes) {
            Some(v) => Self(v),
            None => panic!("offset overflow"),
        }
    }

    /// Offset `bytes` back.
    ///
    /// # Panics
    ///
    /// Panics on underflow.
    #[inline]
    #[must_use]
    #[track_caller]
    pub const fn sub(self, bytes: u32) -> Self {
        match self.0.checked_sub(bytes) {
            Some(v) => Self(v),
            None => panic!("offset underflow"),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({:#x})", self.0)
    }
}

/// A typed, ownerless view of a `T` at an offset.
#[repr(transparent)]
pub struct Pointer<T> {
    offset: Offset,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Pointer<T> {
    /// Tags `offset` as holding a `T`.
    #[inline]
    #[must_use]
    pub const fn new(offset: Offset) -> Self {
        Self {
            offset,
            _marker: PhantomData,
        }
    }

    /// The untyped address.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> Offset {
        self.offset
    }

    /// True when the pointer is at [`Offset::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.offset.is_null()
    }

    /// The `count`-th `T` after this one.
    #[inline]
    #[must_use]
    pub fn add(self, count: u32) -> Self {
        let stride = u32::try_from(std::mem::size_of::<T>()).expect("type larger than u32");
        Self::new(self.offset.add(count.checked_mul(stride).expect("pointer overflow")))
    }

    /// Reinterprets the address as holding a `U`.
    #[inline]
    #[must_use]
    pub const fn cast<U>(self) -> Pointer<U> {
        Pointer::new(self.offset)
    }
}

impl<T: Pod> Pointer<T> {
    /// Loads the value (a byte-for-byte copy of `T`'s footprint).
    #[inline]
    #[must_use]
    pub fn get(self, buffer: &SharedBuffer) -> T {
        buffer.read(self.offset)
    }

    /// Stores the value.
    #[inline]
    pub fn set(self, buffer: &SharedBuffer, value: T) {
        buffer.write(self.offset, value);
    }
}

impl<T> Clone for Pointer<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Pointer<T> {}

impl<T> PartialEq for Pointer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl<T> Eq for Pointer<T> {}

impl<T> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer<{}>({})", std::any::type_name::<T>(), self.offset)
    }
}

// SAFETY: `Pointer<T>` is `repr(transparent)` over a `u32`; the marker is a
// zero-sized `PhantomData<fn() -> T>`. All-zero is the null pointer.
unsafe impl<T: 'static> Zeroable for Pointer<T> {}
// SAFETY: as above; every bit pattern is some offset, there is no padding.
unsafe impl<T: 'static> Pod for Pointer<T> {}

/// A nullable, rebindable reference to a `T`.
///
/// `Ref<T>` is itself `Pod`, so an optional reference can live inside a
/// [`super::Pool`] slot or a flat array element.
#[repr(transparent)]
pub struct Ref<T> {
    target: Offset,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    /// The null reference.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self {
            target: Offset::NULL,
            _marker: PhantomData,
        }
    }

    /// A reference bound to `pointer`.
    #[inline]
    #[must_use]
    pub const fn to(pointer: Pointer<T>) -> Self {
        Self {
            target: pointer.offset(),
            _marker: PhantomData,
        }
    }

    /// True when unbound.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.target.is_null()
    }

    /// The bound pointer, if any.
    #[inline]
    #[must_use]
    pub const fn pointer(self) -> Option<Pointer<T>> {
        if self.target.is_null() {
            None
        } else {
            Some(Pointer::new(self.target))
        }
    }

    /// Rebinds to `pointer`.
    #[inline]
    pub fn bind(&mut self, pointer: Pointer<T>) {
        self.target = pointer.offset();
    }

    /// Clears the binding.
    #[inline]
    pub fn unbind(&mut self) {
        self.target = Offset::NULL;
    }
}

impl<T: Pod> Ref<T> {
    /// Loads the referenced value, `None` when null.
    #[inline]
    #[must_use]
    pub fn get(self, buffer: &SharedBuffer) -> Option<T> {
        self.pointer().map(|p| p.get(buffer))
    }

    /// Stores through the reference.
    ///
    /// # Panics
    ///
    /// Panics when the reference is null.
    #[inline]
    #[track_caller]
    pub fn set(self, buffer: &SharedBuffer, value: T) {
        let pointer = self.pointer().expect("store through a null Ref");
        pointer.set(buffer, value);
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl<T> Eq for Ref<T> {}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ref<{}>(null)", std::any::type_name::<T>())
        } else {
            write!(f, "Ref<{}>({})", std::any::type_name::<T>(), self.target)
        }
    }
}

// SAFETY: `repr(transparent)` over `Offset` (a `u32`); zero is null.
unsafe impl<T: 'static> Zeroable for Ref<T> {}
// SAFETY: no padding, every bit pattern is a valid (possibly dangling) offset.
unsafe impl<T: 'static> Pod for Ref<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pointer_round_trip_boundaries() {
        let buf = SharedBuffer::new(64);
        let at = Offset::new(8);

        macro_rules! round_trip {
            ($($t:ty),*) => {$(
                for v in [<$t>::MIN, <$t>::MAX, 0 as $t] {
                    let p = Pointer::<$t>::new(at);
                    p.set(&buf, v);
                    assert_eq!(p.get(&buf), v);
                }
            )*};
        }
        round_trip!(u8, i8, u16, i16, u32, i32, u64, i64);

        let p = Pointer::<f32>::new(at);
        for v in [f32::MIN, f32::MAX, f32::MIN_POSITIVE, -0.0, f32::INFINITY] {
            p.set(&buf, v);
            assert_eq!(p.get(&buf).to_bits(), v.to_bits());
        }
        let p = Pointer::<f64>::new(at);
        for v in [f64::MIN, f64::MAX, f64::EPSILON, f64::NEG_INFINITY] {
            p.set(&buf, v);
            assert_eq!(p.get(&buf).to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_pointer_structured_value() {
        #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
        #[repr(C)]
        struct Vertex {
            pos: [f32; 3],
            color: u32,
        }

        let buf = SharedBuffer::new(64);
        let p = Pointer::<Vertex>::new(Offset::new(4));
        let v = Vertex {
            pos: [1.0, -2.0, 3.5],
            color: 0xFF00_FF00,
        };
        p.set(&buf, v);
        assert_eq!(p.get(&buf), v);
        assert_eq!(p.add(1).offset(), Offset::new(20));
    }

    #[test]
    fn test_ref_null_and_rebind() {
        let buf = SharedBuffer::new(32);
        let a = Pointer::<u32>::new(Offset::new(8));
        let b = Pointer::<u32>::new(Offset::new(12));
        a.set(&buf, 1);
        b.set(&buf, 2);

        let mut r = Ref::<u32>::null();
        assert!(r.is_null());
        assert_eq!(r.get(&buf), None);

        r.bind(a);
        assert_eq!(r.get(&buf), Some(1));
        r.bind(b);
        r.set(&buf, 20);
        assert_eq!(b.get(&buf), 20);

        r.unbind();
        assert!(r.pointer().is_none());
    }

    #[test]
    fn test_ref_stored_in_buffer() {
        let buf = SharedBuffer::new(32);
        let target = Pointer::<u16>::new(Offset::new(16));
        target.set(&buf, 77);
        let slot = Pointer::<Ref<u16>>::new(Offset::new(4));
        slot.set(&buf, Ref::to(target));
        assert_eq!(slot.get(&buf).get(&buf), Some(77));
    }

    #[test]
    #[should_panic(expected = "null Ref")]
    fn test_ref_set_null_panics() {
        let buf = SharedBuffer::new(8);
        Ref::<u32>::null().set(&buf, 1);
    }

    #[test]
    fn test_offset_display() {
        assert_eq!(Offset::new(0x1234).to_string(), "0x00001234");
        assert!(Offset::NULL.is_null());
    }

    proptest! {
        #[test]
        fn pointer_round_trip_u64(at in 0u32..120, v in any::<u64>()) {
            let buf = SharedBuffer::new(128);
            let p = Pointer::<u64>::new(Offset::new(at));
            p.set(&buf, v);
            prop_assert_eq!(p.get(&buf), v);
        }

        #[test]
        fn pointer_round_trip_i16(at in 0u32..126, v in any::<i16>()) {
            let buf = SharedBuffer::new(128);
            let p = Pointer::<i16>::new(Offset::new(at));
            p.set(&buf, v);
            prop_assert_eq!(p.get(&buf), v);
        }

        #[test]
        fn pointer_round_trip_f64_bits(at in 0u32..120, bits in any::<u64>()) {
            let buf = SharedBuffer::new(128);
            let p = Pointer::<f64>::new(Offset::new(at));
            p.set(&buf, f64::from_bits(bits));
            prop_assert_eq!(p.get(&buf).to_bits(), bits);
        }
    }
}
