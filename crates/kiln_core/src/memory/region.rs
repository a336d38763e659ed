//! # Region Planner
//!
//! Carves the shared buffer into named, fixed, non-overlapping regions. The
//! plan is computed once at startup and handed identically to every thread.

use crate::constants::align_up;
use crate::error::LayoutError;

use super::Offset;

/// A region request: name, byte size and alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSpec {
    /// Unique region name.
    pub name: String,
    /// Size in bytes.
    pub size: u32,
    /// Alignment of the region start (power of two).
    pub align: u32,
}

impl RegionSpec {
    /// Creates a region request.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u32, align: u32) -> Self {
        Self {
            name: name.into(),
            size,
            align,
        }
    }
}

/// A planned region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Region name.
    pub name: String,
    /// First byte.
    pub offset: Offset,
    /// Size in bytes.
    pub size: u32,
    /// Alignment the offset satisfies.
    pub align: u32,
}

impl Region {
    /// Describes an already-placed region.
    #[must_use]
    pub fn new(name: impl Into<String>, offset: Offset, size: u32, align: u32) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            align,
        }
    }

    /// One past the last byte.
    #[inline]
    #[must_use]
    pub fn end(&self) -> Offset {
        self.offset.add(self.size)
    }

    /// True if `offset` lies inside the region.
    #[inline]
    #[must_use]
    pub fn contains(&self, offset: Offset) -> bool {
        (self.offset..self.end()).contains(&offset)
    }
}

/// The ordered result of [`plan_regions`].
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
    total_bytes: u32,
}

impl RegionTable {
    /// Looks a region up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Offset of the named region.
    #[must_use]
    pub fn offset(&self, name: &str) -> Option<Offset> {
        self.get(name).map(|r| r.offset)
    }

    /// Size of the named region.
    #[must_use]
    pub fn size(&self, name: &str) -> Option<u32> {
        self.get(name).map(|r| r.size)
    }

    /// Regions in placement order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True if nothing was planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// End of the last region, rounded up to the heap alignment.
    ///
    /// This is the minimum shared buffer size for the plan.
    #[must_use]
    pub const fn total_bytes(&self) -> u32 {
        self.total_bytes
    }
}

/// Lays `specs` out in order.
///
/// The cursor starts at the first aligned address after [`Offset::NULL`]'s
/// word so that no region (and therefore no allocation) can sit at offset 0.
///
/// # Errors
///
/// [`LayoutError::BadAlignment`] for a non power-of-two alignment (including
/// `heap_align`), [`LayoutError::EmptyRegion`] for a zero-byte region,
/// [`LayoutError::DuplicateRegion`] for a repeated name and
/// [`LayoutError::AddressOverflow`] when the plan exceeds `u32`.
pub fn plan_regions(specs: &[RegionSpec], heap_align: u32) -> Result<RegionTable, LayoutError> {
    if !heap_align.is_power_of_two() {
        return Err(LayoutError::BadAlignment {
            name: "heap".to_owned(),
            align: heap_align,
        });
    }

    let mut regions: Vec<Region> = Vec::with_capacity(specs.len());
    let mut cursor: u32 = NULL_GUARD;

    for spec in specs {
        if !spec.align.is_power_of_two() {
            return Err(LayoutError::BadAlignment {
                name: spec.name.clone(),
                align: spec.align,
            });
        }
        if spec.size == 0 {
            return Err(LayoutError::EmptyRegion(spec.name.clone()));
        }
        if regions.iter().any(|r| r.name == spec.name) {
            return Err(LayoutError::DuplicateRegion(spec.name.clone()));
        }

        let offset = align_up(cursor, spec.align)
            .ok_or_else(|| LayoutError::AddressOverflow(spec.name.clone()))?;
        cursor = offset
            .checked_add(spec.size)
            .ok_or_else(|| LayoutError::AddressOverflow(spec.name.clone()))?;

        regions.push(Region::new(spec.name.clone(), Offset::new(offset), spec.size, spec.align));
    }

    let total_bytes =
        align_up(cursor, heap_align).ok_or_else(|| LayoutError::AddressOverflow("heap".to_owned()))?;

    tracing::debug!(regions = regions.len(), total_bytes, "planned shared buffer regions");

    Ok(RegionTable {
        regions,
        total_bytes,
    })
}

/// Bytes reserved at the start of the buffer so offset 0 stays null.
const NULL_GUARD: u32 = 4;
