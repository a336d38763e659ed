//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every section and field has a default,
//! so an empty file is a valid configuration.
//!
//! ```toml
//! [threads]
//! count = 4
//!
//! [surface]
//! width = 320
//! height = 180
//!
//! [memory]
//! thread_heap_bytes = 1048576
//! overflow_bytes = 4194304
//! max_alloc_bytes = 1048576
//! heap_alignment = 64
//!
//! [assets]
//! glyph_atlas_bytes = 65536
//! texture_bytes = 262144
//! texture_index_entries = 64
//!
//! [frame]
//! budget_us = 16666
//! ```

use std::path::Path;

use kiln_core::constants::{ALIGN, MIN_BLOCK};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Thread pool.
    pub threads: ThreadConfig,
    /// Render surface.
    pub surface: SurfaceConfig,
    /// Allocator sizing.
    pub memory: MemoryConfig,
    /// Asset regions reserved for external loaders.
    pub assets: AssetConfig,
    /// Frame pacing.
    pub frame: FrameConfig,
}

/// Thread pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThreadConfig {
    /// Threads including the coordinator.
    pub count: u32,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Render surface size in pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurfaceConfig {
    /// Pixels per row.
    pub width: u32,
    /// Rows.
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
        }
    }
}

/// Allocator sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Private heap per thread.
    pub thread_heap_bytes: u32,
    /// Shared overflow region.
    pub overflow_bytes: u32,
    /// Largest single allocation.
    pub max_alloc_bytes: u32,
    /// Alignment of the overflow and heap regions.
    pub heap_alignment: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            thread_heap_bytes: 1 << 20,
            overflow_bytes: 4 << 20,
            max_alloc_bytes: 1 << 20,
            heap_alignment: 64,
        }
    }
}

/// Opaque asset regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetConfig {
    /// Glyph atlas bytes.
    pub glyph_atlas_bytes: u32,
    /// Texture and mipmap bytes.
    pub texture_bytes: u32,
    /// Texture index slots.
    pub texture_index_entries: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            glyph_atlas_bytes: 64 << 10,
            texture_bytes: 256 << 10,
            texture_index_entries: 64,
        }
    }
}

/// Frame pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    /// Frames slower than this are logged.
    pub budget_us: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { budget_us: 16_666 }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`EngineError::Toml`] for malformed input, [`EngineError::Config`] for
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// [`EngineError::TomlEncode`] if serialisation fails.
    pub fn to_toml_string(&self) -> EngineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks ranges and cross-field constraints.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] naming the first offending field.
    pub fn validate(&self) -> EngineResult<()> {
        let fail = |msg: String| -> EngineResult<()> { Err(EngineError::Config(msg)) };

        if self.threads.count == 0 {
            return fail("threads.count must be at least 1".into());
        }
        if self.surface.width == 0 || self.surface.height == 0 {
            return fail("surface.width and surface.height must be non-zero".into());
        }
        if self.threads.count > self.surface.height {
            return fail(format!(
                "threads.count ({}) exceeds surface.height ({})",
                self.threads.count, self.surface.height
            ));
        }
        let align = self.memory.heap_alignment;
        if !align.is_power_of_two() || align < ALIGN {
            return fail(format!("memory.heap_alignment ({align}) must be a power of two >= {ALIGN}"));
        }
        if self.memory.max_alloc_bytes == 0 {
            return fail("memory.max_alloc_bytes must be non-zero".into());
        }
        if self.memory.max_alloc_bytes > self.memory.overflow_bytes {
            return fail(format!(
                "memory.max_alloc_bytes ({}) exceeds memory.overflow_bytes ({})",
                self.memory.max_alloc_bytes, self.memory.overflow_bytes
            ));
        }
        let assets = [
            ("assets.glyph_atlas_bytes", self.assets.glyph_atlas_bytes),
            ("assets.texture_bytes", self.assets.texture_bytes),
            ("assets.texture_index_entries", self.assets.texture_index_entries),
        ];
        if let Some((field, _)) = assets.iter().find(|(_, v)| *v == 0) {
            return fail(format!("{field} must be non-zero"));
        }
        if self.memory.thread_heap_bytes < MIN_BLOCK {
            return fail(format!("memory.thread_heap_bytes must be at least {MIN_BLOCK}"));
        }
        Ok(())
    }
}
