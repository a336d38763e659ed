//! # Render Surface
//!
//! An RGBA8 view over the framebuffer region. Row `y` starts at
//! `base + y * width * 4`. Each thread writes only the rows of its own band.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use kiln_core::{Offset, RowBand, SharedBuffer};

/// One pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba8 {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque black.
    pub const BLACK: Self = Self::new(0, 0, 0, 255);

    /// Creates a pixel.
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// A shared handle onto the framebuffer.
#[derive(Debug, Clone)]
pub struct Surface {
    buffer: Arc<SharedBuffer>,
    base: Offset,
    width: u32,
    height: u32,
}

impl Surface {
    /// Wraps `width * height` pixels at `base`.
    ///
    /// # Panics
    ///
    /// Panics if the pixels do not fit in `buffer`.
    #[must_use]
    pub fn new(buffer: &Arc<SharedBuffer>, base: Offset, width: u32, height: u32) -> Self {
        let bytes = u64::from(width) * u64::from(height) * 4;
        assert!(
            u64::from(base.get()) + bytes <= u64::from(buffer.len()),
            "surface outside buffer"
        );
        Self {
            buffer: Arc::clone(buffer),
            base,
            width,
            height,
        }
    }

    /// Pixels per row.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Rows.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Writes one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the surface.
    #[inline]
    pub fn put_pixel(&self, x: u32, y: u32, color: Rgba8) {
        self.buffer.write(self.at(x, y), color);
    }

    /// Reads one pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the surface.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba8 {
        self.buffer.read(self.at(x, y))
    }

    /// Writes a whole row from `pixels`.
    ///
    /// # Panics
    ///
    /// Panics if `y` is out of range or `pixels.len() != width`.
    pub fn write_row(&self, y: u32, pixels: &[Rgba8]) {
        assert_eq!(pixels.len(), self.width as usize, "row length");
        self.buffer.write_bytes(self.at(0, y), bytemuck::cast_slice(pixels));
    }

    /// Copies one row of packed pixels from `src` elsewhere in the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `y` or the source range is out of range.
    pub fn copy_row_from(&self, y: u32, src: Offset) {
        self.buffer.copy_within(src, self.at(0, y), self.width * 4);
    }

    /// Fills every row of `band` with `color`.
    ///
    /// # Panics
    ///
    /// Panics if the band extends past the last row.
    pub fn fill_band(&self, band: RowBand, color: Rgba8) {
        if band.is_empty() {
            return;
        }
        for x in 0..self.width {
            self.put_pixel(x, band.start, color);
        }
        let first = self.at(0, band.start);
        for y in band.start + 1..band.end {
            self.buffer.copy_within(first, self.at(0, y), self.width * 4);
        }
    }

    /// Copies the surface out, row-major.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Rgba8> {
        self.snapshot_bytes()
            .chunks_exact(4)
            .map(|c| Rgba8::new(c[0], c[1], c[2], c[3]))
            .collect()
    }

    /// Copies the raw RGBA bytes out, row-major.
    #[must_use]
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        self.buffer.snapshot(self.base, self.width * self.height * 4)
    }

    #[inline]
    #[track_caller]
    fn at(&self, x: u32, y: u32) -> Offset {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} surface",
            self.width,
            self.height
        );
        self.base.add((y * self.width + x) * 4)
    }
}
