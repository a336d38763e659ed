//! # Engine Layout
//!
//! The concrete region plan for one engine instance:
//!
//! ```text
//! ┌─────────┬──────┬─────────────┬────────┬──────────┬───────────────┐
//! │ control │ sync │ framebuffer │ glyphs │ textures │ texture_index │
//! └─────────┴──────┴─────────────┴────────┴──────────┴───────────────┘
//! ┌──────────┬────────┬────────┬─────┬──────────┐
//! │ overflow │ heap.0 │ heap.1 │ ... │ heap.n-1 │   heap area
//! └──────────┴────────┴────────┴─────┴──────────┘
//! ```
//!
//! Glyphs, textures and the texture index are reserved for external asset
//! loaders; the engine never interprets their bytes.

use bytemuck::{Pod, Zeroable};
use kiln_core::constants::HEAP_ALIGN;
use kiln_core::{plan_regions, Offset, Region, RegionSpec, RegionTable, CONTROL_BYTES};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Quit flag and frame number.
pub const CONTROL: &str = "control";
/// One sync cell per thread.
pub const SYNC: &str = "sync";
/// RGBA8 render surface.
pub const FRAMEBUFFER: &str = "framebuffer";
/// Glyph atlas.
pub const GLYPHS: &str = "glyphs";
/// Texture and mipmap pixels.
pub const TEXTURES: &str = "textures";
/// Texture index entries.
pub const TEXTURE_INDEX: &str = "texture_index";
/// Shared overflow heap.
pub const OVERFLOW: &str = "overflow";

/// Name of thread `index`'s private heap.
#[must_use]
pub fn heap_name(index: u32) -> String {
    format!("heap.{index}")
}

/// One texture index slot (16 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureIndexEntry {
    /// Start of the pixels inside the textures region.
    pub offset: Offset,
    /// Width of mip level 0.
    pub width: u16,
    /// Height of mip level 0.
    pub height: u16,
    /// Mip levels stored back to back.
    pub mip_levels: u32,
    /// Loader-defined pixel format tag.
    pub format: u32,
}

/// Bytes per texture index slot.
pub const TEXTURE_INDEX_ENTRY_BYTES: u32 = std::mem::size_of::<TextureIndexEntry>() as u32;

/// The planned region table plus the numbers derived from it.
#[derive(Debug, Clone)]
pub struct EngineLayout {
    table: RegionTable,
    threads: u32,
}

impl EngineLayout {
    /// Plans every region for `config`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if a region size overflows `u32`, and
    /// [`EngineError::Layout`] if the plan does not fit the address space.
    pub fn plan(config: &EngineConfig) -> EngineResult<Self> {
        let threads = config.threads.count;
        let heap_align = config.memory.heap_alignment;
        let overflow = |what: &str| EngineError::Config(format!("{what} size overflows u32"));

        let framebuffer = config
            .surface
            .width
            .checked_mul(config.surface.height)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(|| overflow(FRAMEBUFFER))?;
        let index = config
            .assets
            .texture_index_entries
            .checked_mul(TEXTURE_INDEX_ENTRY_BYTES)
            .ok_or_else(|| overflow(TEXTURE_INDEX))?;

        let sync = threads.checked_mul(4).ok_or_else(|| overflow(SYNC))?;

        let mut specs = vec![
            RegionSpec::new(CONTROL, CONTROL_BYTES, 8),
            RegionSpec::new(SYNC, sync, HEAP_ALIGN),
            RegionSpec::new(FRAMEBUFFER, framebuffer, HEAP_ALIGN),
            RegionSpec::new(GLYPHS, config.assets.glyph_atlas_bytes, HEAP_ALIGN),
            RegionSpec::new(TEXTURES, config.assets.texture_bytes, HEAP_ALIGN),
            RegionSpec::new(TEXTURE_INDEX, index, 16),
            RegionSpec::new(OVERFLOW, config.memory.overflow_bytes, heap_align),
        ];
        specs.extend(
            (0..threads).map(|i| RegionSpec::new(heap_name(i), config.memory.thread_heap_bytes, heap_align)),
        );

        let table = plan_regions(&specs, heap_align)?;
        let layout = Self { table, threads };

        for region in layout.table.iter() {
            tracing::debug!(
                name = %region.name,
                offset = %region.offset,
                size = region.size,
                "region"
            );
        }
        tracing::debug!(
            total = layout.total_bytes(),
            heap_base = %layout.heap_base(),
            "engine layout planned"
        );
        Ok(layout)
    }

    /// The underlying table.
    #[must_use]
    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    /// Looks up a region that every layout has.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not part of the plan.
    #[must_use]
    #[track_caller]
    pub fn region(&self, name: &str) -> &Region {
        self.table
            .get(name)
            .unwrap_or_else(|| panic!("region {name} is not in the layout"))
    }

    /// Thread `index`'s private heap region.
    #[must_use]
    pub fn heap(&self, index: u32) -> &Region {
        self.region(&heap_name(index))
    }

    /// Threads the layout was planned for.
    #[must_use]
    pub const fn threads(&self) -> u32 {
        self.threads
    }

    /// Start of the heap area (the overflow region; thread heaps follow).
    #[must_use]
    pub fn heap_base(&self) -> Offset {
        self.region(OVERFLOW).offset
    }

    /// Shared buffer size the plan needs.
    #[must_use]
    pub const fn total_bytes(&self) -> u32 {
        self.table.total_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::LayoutError;
    use proptest::prelude::*;

    fn config(threads: u32) -> EngineConfig {
        let mut c = EngineConfig::default();
        c.threads.count = threads;
        c.surface.width = 16;
        c.surface.height = 8;
        c.memory.thread_heap_bytes = 4096;
        c.memory.overflow_bytes = 8192;
        c.memory.max_alloc_bytes = 1024;
        c.assets.glyph_atlas_bytes = 256;
        c.assets.texture_bytes = 512;
        c.assets.texture_index_entries = 4;
        c
    }

    #[test]
    fn test_region_order_and_sizes() {
        let layout = EngineLayout::plan(&config(3)).unwrap();
        let names: Vec<_> = layout.table().iter().map(|r| r.name.clone()).collect();
        assert_eq!(
            names,
            [
                "control",
                "sync",
                "framebuffer",
                "glyphs",
                "textures",
                "texture_index",
                "overflow",
                "heap.0",
                "heap.1",
                "heap.2"
            ]
        );
        assert_eq!(layout.region(SYNC).size, 12);
        assert_eq!(layout.region(FRAMEBUFFER).size, 16 * 8 * 4);
        assert_eq!(layout.region(TEXTURE_INDEX).size, 64);
        assert_eq!(layout.heap(2).size, 4096);
    }

    #[test]
    fn test_heap_area_aligned_and_last() {
        let mut c = config(2);
        c.memory.heap_alignment = 256;
        let layout = EngineLayout::plan(&c).unwrap();
        assert_eq!(layout.heap_base().get() % 256, 0);
        for i in 0..2 {
            assert_eq!(layout.heap(i).offset.get() % 256, 0);
            assert!(layout.heap(i).offset > layout.heap_base());
        }
        assert!(layout.total_bytes() >= layout.heap(1).end().get());
        assert!(layout.region(TEXTURE_INDEX).end() <= layout.heap_base());
        assert_eq!(layout.heap_base(), layout.region(OVERFLOW).offset);
        assert_eq!(layout.total_bytes(), layout.table().total_bytes());
        assert!(layout.heap_base().get() < layout.total_bytes());
    }

    #[test]
    fn test_framebuffer_overflow_rejected() {
        let mut c = config(1);
        c.surface.width = u32::MAX;
        assert!(matches!(EngineLayout::plan(&c), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_empty_asset_region_rejected() {
        let mut c = config(1);
        c.assets.glyph_atlas_bytes = 0;
        let err = EngineLayout::plan(&c).unwrap_err();
        assert!(
            matches!(&err, EngineError::Layout(LayoutError::EmptyRegion(name)) if name == GLYPHS),
            "{err}"
        );
    }

    #[test]
    fn test_texture_entry_is_sixteen_bytes() {
        assert_eq!(TEXTURE_INDEX_ENTRY_BYTES, 16);
    }

    proptest! {
        #[test]
        fn heaps_disjoint_and_inside_buffer(
            threads in 1u32..9,
            heap_kib in 1u32..64,
            shift in 3u32..10,
        ) {
            let mut c = config(threads);
            c.memory.thread_heap_bytes = heap_kib << 10;
            c.memory.heap_alignment = 1 << shift;
            let layout = EngineLayout::plan(&c).unwrap();

            let overflow = layout.region(OVERFLOW);
            prop_assert!(overflow.end() <= layout.heap(0).offset);
            for i in 0..threads {
                let heap = layout.heap(i);
                prop_assert_eq!(heap.offset.get() % (1 << shift), 0);
                prop_assert!(heap.end().get() <= layout.total_bytes());
                if i + 1 < threads {
                    prop_assert!(heap.end() <= layout.heap(i + 1).offset);
                }
            }
        }
    }
}
