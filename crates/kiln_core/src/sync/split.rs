//! # Row Bands
//!
//! Integer range split of the surface rows across threads. The first
//! `rows % bands` bands get one extra row.

/// A half-open range of rows `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowBand {
    /// First row.
    pub start: u32,
    /// One past the last row.
    pub end: u32,
}

impl RowBand {
    /// Rows in the band.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end - self.start
    }

    /// True for a band with no rows.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// True if `row` falls in the band.
    #[inline]
    #[must_use]
    pub fn contains(self, row: u32) -> bool {
        (self.start..self.end).contains(&row)
    }
}

/// Band `index` of `bands` over `rows` rows.
///
/// # Panics
///
/// Panics if `bands` is zero or `index >= bands`.
#[must_use]
pub fn band_for(rows: u32, bands: u32, index: u32) -> RowBand {
    assert!(bands > 0, "cannot split rows into zero bands");
    assert!(index < bands, "band {index} of {bands}");
    let base = rows / bands;
    let extra = rows % bands;
    let start = index * base + index.min(extra);
    let len = base + u32::from(index < extra);
    RowBand {
        start,
        end: start + len,
    }
}

/// All `bands` bands over `rows` rows, in order.
///
/// # Panics
///
/// Panics if `bands` is zero.
#[must_use]
pub fn split_rows(rows: u32, bands: u32) -> Vec<RowBand> {
    (0..bands).map(|i| band_for(rows, bands, i)).collect()
}
