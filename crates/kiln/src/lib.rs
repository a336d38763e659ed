//! # KILN
//!
//! One import for the whole engine.
//!
//! ```text
//! kiln
//!  ├─ core    shared buffer, allocators, containers, frame barrier
//!  ├─ render  configuration, layout, thread contexts, render pool
//!  └─ demo    gradient renderer + checksum presenter
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod demo;

pub use kiln_core as core;
pub use kiln_render as render;

pub use kiln_core::{Offset, Pointer, Ref, RowBand, ThreadHeap};
pub use kiln_render::{
    BandRenderer, BandTarget, EngineConfig, EngineError, EngineResult, FrameStats, Presenter,
    RenderLoopStats, RenderPool, Rgba8, Surface, WorkerReport,
};
