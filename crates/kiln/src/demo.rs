//! Demo collaborators: something to draw and something to look at it.

use kiln_core::FixedArray;
use kiln_render::{BandRenderer, BandTarget, Presenter, Rgba8, Surface};

/// Draws a diagonal gradient that scrolls one pixel per frame.
///
/// Each band builds its rows in a scratch array from the thread heap, copies
/// them onto the surface inside the shared buffer and frees the scratch
/// before returning.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientRenderer {
    bands_drawn: u64,
}

impl GradientRenderer {
    /// Creates the renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self { bands_drawn: 0 }
    }

    /// Bands this instance has drawn.
    #[must_use]
    pub const fn bands_drawn(&self) -> u64 {
        self.bands_drawn
    }

    /// Color at `(x, y)` of `frame`.
    #[must_use]
    pub fn color(x: u32, y: u32, frame: u64) -> Rgba8 {
        let shift = (frame & 0xFF) as u32;
        Rgba8::new(
            (x.wrapping_add(shift) & 0xFF) as u8,
            (y & 0xFF) as u8,
            (x.wrapping_add(y).wrapping_add(shift) & 0xFF) as u8,
            255,
        )
    }
}

impl BandRenderer for GradientRenderer {
    fn render_band(&mut self, target: BandTarget<'_>) {
        let BandTarget {
            surface,
            band,
            frame,
            heap,
            ..
        } = target;
        let width = surface.width();
        let row: FixedArray<Rgba8> = FixedArray::new(heap, width);
        let data = row.pointer(0).offset();

        for y in band.start..band.end {
            for x in 0..width {
                row.set(x, Self::color(x, y, frame));
            }
            surface.copy_row_from(y, data);
        }

        row.free(heap);
        self.bands_drawn += 1;
    }
}

/// Folds every presented frame into an FNV-1a checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumPresenter {
    frames: u64,
    last: u64,
}

impl ChecksumPresenter {
    /// Creates the presenter.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: 0, last: 0 }
    }

    /// Frames presented.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Checksum of the last frame.
    #[must_use]
    pub const fn last_checksum(&self) -> u64 {
        self.last
    }

    /// FNV-1a over the surface bytes.
    #[must_use]
    pub fn checksum(surface: &Surface) -> u64 {
        const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0100_0000_01b3;
        surface
            .snapshot_bytes()
            .iter()
            .fold(OFFSET_BASIS, |h, &b| (h ^ u64::from(b)).wrapping_mul(PRIME))
    }
}

impl Presenter for ChecksumPresenter {
    fn present(&mut self, frame: u64, surface: &Surface) {
        self.last = Self::checksum(surface);
        self.frames += 1;
        tracing::trace!(frame, checksum = self.last, "presented");
    }
}
