//! # Shared Buffer
//!
//! The single flat memory every thread works in.
//!
//! ## Safety Note
//!
//! This module is the only place that touches raw bytes. It needs unsafe code
//! for unaligned typed loads/stores; every other module goes through the
//! bounds-checked API below.
//!
//! ## Ownership Discipline
//!
//! The backing words are `AtomicU32`, so the buffer is `Sync` and any 4-aligned
//! cell can be used atomically via [`SharedBuffer::cell`]. Plain byte access is
//! not synchronized: a byte range may only be written by the thread that owns
//! it (its heap sub-region, its row band, a block it allocated) and read by
//! others only after a release/acquire handoff through a sync cell or the
//! overflow mutex.

#![allow(unsafe_code)]

use std::sync::atomic::AtomicU32;

use bytemuck::Pod;

use super::Offset;

/// Zeroed, 4-byte aligned memory shared by every engine thread.
pub struct SharedBuffer {
    /// Backing storage; interior mutability comes from the atomics.
    words: Box<[AtomicU32]>,
    /// Length in bytes (multiple of 4).
    len: u32,
}

impl SharedBuffer {
    /// Allocates a zeroed buffer of at least `len` bytes (rounded up to 4).
    ///
    /// This is the only host allocation the engine makes for its memory.
    ///
    /// # Panics
    ///
    /// Panics if `len` rounded up to a multiple of 4 overflows `u32`.
    #[must_use]
    pub fn new(len: u32) -> Self {
        let words = len.checked_add(3).expect("buffer length overflows u32") / 4;
        let storage: Vec<AtomicU32> = (0..words).map(|_| AtomicU32::new(0)).collect();
        Self {
            words: storage.into_boxed_slice(),
            len: words * 4,
        }
    }

    /// Returns the length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Returns true for a zero-length buffer.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the atomic cell at a 4-aligned offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is unaligned or out of range.
    #[inline]
    #[must_use]
    pub fn cell(&self, offset: Offset) -> &AtomicU32 {
        let at = offset.get();
        assert!(at % 4 == 0, "unaligned sync cell at {offset}");
        self.check(at, 4);
        &self.words[(at / 4) as usize]
    }

    /// Loads a `T` from `offset` (any alignment).
    ///
    /// # Panics
    ///
    /// Panics if `[offset, offset + size_of::<T>())` is out of range.
    #[inline]
    #[must_use]
    pub fn read<T: Pod>(&self, offset: Offset) -> T {
        let at = offset.get();
        self.check(at, size_of_u32::<T>());
        // SAFETY: the range is in bounds (checked above), `T: Pod` accepts any
        // bit pattern, and `read_unaligned` has no alignment requirement.
        unsafe { self.base().add(at as usize).cast::<T>().read_unaligned() }
    }

    /// Stores a `T` at `offset` (any alignment).
    ///
    /// # Panics
    ///
    /// Panics if `[offset, offset + size_of::<T>())` is out of range.
    #[inline]
    pub fn write<T: Pod>(&self, offset: Offset, value: T) {
        let at = offset.get();
        self.check(at, size_of_u32::<T>());
        // SAFETY: in bounds (checked above); the words are `UnsafeCell`-backed
        // atomics so writing through a shared reference is permitted; the
        // caller owns the range per the module's ownership discipline.
        unsafe { self.base().add(at as usize).cast::<T>().write_unaligned(value) }
    }

    /// Copies `out.len()` bytes starting at `offset` into `out`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn read_bytes(&self, offset: Offset, out: &mut [u8]) {
        let len = u32::try_from(out.len()).expect("read length overflows u32");
        self.check(offset.get(), len);
        // SAFETY: source range in bounds; `out` is a distinct host slice.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base().add(offset.get() as usize),
                out.as_mut_ptr(),
                out.len(),
            );
        }
    }

    /// Copies `bytes` into the buffer at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn write_bytes(&self, offset: Offset, bytes: &[u8]) {
        let len = u32::try_from(bytes.len()).expect("write length overflows u32");
        self.check(offset.get(), len);
        // SAFETY: destination range in bounds; `bytes` is a distinct host slice.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.base().add(offset.get() as usize),
                bytes.len(),
            );
        }
    }

    /// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
    ///
    /// # Panics
    ///
    /// Panics if either range is out of bounds.
    pub fn copy_within(&self, src: Offset, dst: Offset, len: u32) {
        self.check(src.get(), len);
        self.check(dst.get(), len);
        // SAFETY: both ranges in bounds; `copy` is overlap-safe.
        unsafe {
            std::ptr::copy(
                self.base().add(src.get() as usize),
                self.base().add(dst.get() as usize),
                len as usize,
            );
        }
    }

    /// Sets `len` bytes at `offset` to `byte`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn fill(&self, offset: Offset, len: u32, byte: u8) {
        self.check(offset.get(), len);
        // SAFETY: range in bounds.
        unsafe {
            std::ptr::write_bytes(self.base().add(offset.get() as usize), byte, len as usize);
        }
    }

    /// Copies a range out into a host vector (presentation, tests).
    #[must_use]
    pub fn snapshot(&self, offset: Offset, len: u32) -> Vec<u8> {
        let mut out = vec![0u8; len as usize];
        self.read_bytes(offset, &mut out);
        out
    }

    /// Fatal bounds check shared by every accessor.
    #[inline]
    #[track_caller]
    fn check(&self, at: u32, len: u32) {
        let end = at.checked_add(len);
        assert!(
            matches!(end, Some(end) if end <= self.len),
            "buffer access out of range: [{at:#x}, +{len}) in {} bytes",
            self.len
        );
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        self.words.as_ptr().cast::<u8>().cast_mut()
    }
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer").field("len", &self.len).finish()
    }
}

#[inline]
fn size_of_u32<T>() -> u32 {
    u32::try_from(std::mem::size_of::<T>()).expect("type larger than the address space")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_buffer_rounds_up_and_zeroes() {
        let buf = SharedBuffer::new(13);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.read::<u64>(Offset::new(8)), 0);
    }

    #[test]
    fn test_unaligned_read_write() {
        let buf = SharedBuffer::new(64);
        buf.write(Offset::new(3), 0xDEAD_BEEF_u32);
        assert_eq!(buf.read::<u32>(Offset::new(3)), 0xDEAD_BEEF);
        buf.write(Offset::new(17), -1.5f64);
        assert!((buf.read::<f64>(Offset::new(17)) + 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cell_shares_bytes_with_plain_access() {
        let buf = SharedBuffer::new(16);
        buf.write(Offset::new(4), 7u32);
        assert_eq!(buf.cell(Offset::new(4)).load(Ordering::Relaxed), 7);
        buf.cell(Offset::new(8)).store(9, Ordering::Relaxed);
        assert_eq!(buf.read::<u32>(Offset::new(8)), 9);
    }

    #[test]
    fn test_copy_within_overlapping() {
        let buf = SharedBuffer::new(16);
        buf.write_bytes(Offset::new(0), &[1, 2, 3, 4, 5, 6]);
        buf.copy_within(Offset::new(0), Offset::new(2), 6);
        assert_eq!(buf.snapshot(Offset::new(0), 8), vec![1, 2, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_fill() {
        let buf = SharedBuffer::new(8);
        buf.fill(Offset::new(2), 4, 0xAB);
        assert_eq!(buf.snapshot(Offset::new(0), 8), vec![0, 0, 0xAB, 0xAB, 0xAB, 0xAB, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "buffer access out of range")]
    fn test_read_past_end_panics() {
        let buf = SharedBuffer::new(8);
        let _ = buf.read::<u64>(Offset::new(4));
    }

    #[test]
    #[should_panic(expected = "unaligned sync cell")]
    fn test_unaligned_cell_panics() {
        let buf = SharedBuffer::new(8);
        let _ = buf.cell(Offset::new(2));
    }
}
