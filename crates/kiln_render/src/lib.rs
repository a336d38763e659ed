//! # KILN Render
//!
//! The engine runtime on top of `kiln_core`: configuration, the concrete
//! region plan, per-thread contexts and the render pool.
//!
//! ## Frame Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ coordinator (thread 0)          workers (threads 1..n)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ frame += 1, dispatch  ───────▶  wake, render own band       │
//! │ render own band                 complete ──┐                │
//! │ wait_all ◀─────────────────────────────────┘                │
//! │ present(surface)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_render::{BandTarget, EngineConfig, RenderPool, Rgba8};
//!
//! let config = EngineConfig::default();
//! let mut pool = RenderPool::spawn(&config, |_thread| {
//!     |t: BandTarget<'_>| t.surface.fill_band(t.band, Rgba8::BLACK)
//! })?;
//!
//! let stats = pool.render_frame();
//! let reports = pool.shutdown()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod error;
pub mod layout;
pub mod pool;
pub mod stats;
pub mod surface;

pub use config::{AssetConfig, EngineConfig, FrameConfig, MemoryConfig, SurfaceConfig, ThreadConfig};
pub use context::{BandRenderer, BandTarget, FrameOutcome, SharedMemory, ThreadContext};
pub use error::{EngineError, EngineResult};
pub use layout::{heap_name, EngineLayout, TextureIndexEntry, TEXTURE_INDEX_ENTRY_BYTES};
pub use pool::{Presenter, RenderPool, WorkerReport};
pub use stats::{FrameStats, RenderLoopStats};
pub use surface::{Rgba8, Surface};
