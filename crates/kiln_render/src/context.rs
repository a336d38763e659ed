//! # Thread Context
//!
//! Everything one engine thread needs, built once at thread start from the
//! shared region table:
//!
//! ```text
//! ThreadContext
//!  ├─ ThreadHeap        private heap.<i>, backed by the overflow region
//!  ├─ FrameBarrier      control + sync regions
//!  ├─ Surface           framebuffer region
//!  └─ RowBand           rows this thread renders
//! ```

use std::sync::Arc;

use kiln_core::{
    band_for, FrameBarrier, HeapReport, Offset, OverflowAllocator, Pointer, RowBand, SharedBuffer,
    ThreadHeap, WorkerSignal,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::layout::{
    EngineLayout, TextureIndexEntry, CONTROL, FRAMEBUFFER, OVERFLOW, SYNC, TEXTURE_INDEX,
    TEXTURE_INDEX_ENTRY_BYTES,
};
use crate::surface::Surface;

// =============================================================================
// SHARED MEMORY
// =============================================================================

/// The sized buffer and its plan. Cloning shares both.
#[derive(Debug, Clone)]
pub struct SharedMemory {
    buffer: Arc<SharedBuffer>,
    layout: Arc<EngineLayout>,
    config: Arc<EngineConfig>,
}

impl SharedMemory {
    /// Validates `config`, plans the regions and allocates the zeroed buffer.
    ///
    /// # Errors
    ///
    /// Configuration and layout errors.
    pub fn allocate(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let layout = EngineLayout::plan(config)?;
        let buffer = SharedBuffer::new(layout.total_bytes());
        tracing::info!(
            bytes = buffer.len(),
            threads = layout.threads(),
            "shared memory allocated"
        );
        Ok(Self {
            buffer: Arc::new(buffer),
            layout: Arc::new(layout),
            config: Arc::new(config.clone()),
        })
    }

    /// The buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<SharedBuffer> {
        &self.buffer
    }

    /// The region plan.
    #[must_use]
    pub fn layout(&self) -> &EngineLayout {
        &self.layout
    }

    /// The configuration the plan was made from.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A barrier view for any thread.
    #[must_use]
    pub fn barrier(&self) -> FrameBarrier {
        FrameBarrier::new(
            &self.buffer,
            self.layout.region(CONTROL).offset,
            self.layout.region(SYNC).offset,
            self.layout.threads(),
        )
    }

    /// A surface view for any thread.
    #[must_use]
    pub fn surface(&self) -> Surface {
        Surface::new(
            &self.buffer,
            self.layout.region(FRAMEBUFFER).offset,
            self.config.surface.width,
            self.config.surface.height,
        )
    }

    /// Slot `index` of the texture index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is past the configured entry count.
    #[must_use]
    pub fn texture_entry(&self, index: u32) -> Pointer<TextureIndexEntry> {
        assert!(
            index < self.config.assets.texture_index_entries,
            "texture index slot {index} out of range"
        );
        let base = self.layout.region(TEXTURE_INDEX).offset;
        Pointer::new(base.add(index * TEXTURE_INDEX_ENTRY_BYTES))
    }
}

// =============================================================================
// RENDERING SEAM
// =============================================================================

/// What a renderer gets for one band of one frame.
#[derive(Debug)]
pub struct BandTarget<'a> {
    /// The shared surface; write only rows in `band`.
    pub surface: &'a Surface,
    /// Rows owned by this thread.
    pub band: RowBand,
    /// Frame number.
    pub frame: u64,
    /// Thread index.
    pub thread: u32,
    /// This thread's heap for scratch allocations.
    pub heap: &'a mut ThreadHeap,
}

/// Renders one band. The same entry point runs on the coordinator and on
/// every worker.
pub trait BandRenderer {
    /// Draws `target.band` for `target.frame`.
    fn render_band(&mut self, target: BandTarget<'_>);
}

impl<F> BandRenderer for F
where
    F: FnMut(BandTarget<'_>),
{
    fn render_band(&mut self, target: BandTarget<'_>) {
        self(target);
    }
}

/// Result of one [`ThreadContext::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The band for `frame` is done (coordinator: the whole surface is).
    Rendered {
        /// Frame number.
        frame: u64,
    },
    /// Shutdown was signalled; the thread should exit its loop.
    Shutdown,
}

// =============================================================================
// THREAD CONTEXT
// =============================================================================

/// One thread's allocators and views.
#[derive(Debug)]
pub struct ThreadContext {
    index: u32,
    threads: u32,
    coordinator: bool,
    heap: ThreadHeap,
    barrier: FrameBarrier,
    surface: Surface,
    band: RowBand,
    frame: u64,
}

impl ThreadContext {
    /// Builds the context for thread `index` of `threads`.
    ///
    /// # Errors
    ///
    /// [`EngineError::WorkerInit`] if the arguments disagree with the layout
    /// (index out of range, thread count mismatch, coordinator not index 0);
    /// [`EngineError::Memory`] if a heap region is unusable.
    pub fn init(
        shared: &SharedMemory,
        index: u32,
        threads: u32,
        is_coordinator: bool,
    ) -> EngineResult<Self> {
        let reject = |reason: String| EngineError::WorkerInit { index, reason };
        if threads != shared.layout().threads() {
            return Err(reject(format!(
                "layout planned for {} threads, asked for {threads}",
                shared.layout().threads()
            )));
        }
        if index >= threads {
            return Err(reject(format!("index out of range for {threads} threads")));
        }
        if is_coordinator != (index == 0) {
            return Err(reject("thread 0 and only thread 0 coordinates".into()));
        }

        let buffer = shared.buffer();
        let overflow = OverflowAllocator::attach(
            buffer,
            shared.layout().region(OVERFLOW),
            shared.config().memory.max_alloc_bytes,
        )?;
        let heap = ThreadHeap::new(buffer, shared.layout().heap(index), overflow)?;
        let band = band_for(shared.config().surface.height, threads, index);

        tracing::debug!(index, rows = ?(band.start..band.end), "thread context ready");
        Ok(Self {
            index,
            threads,
            coordinator: is_coordinator,
            heap,
            barrier: shared.barrier(),
            surface: shared.surface(),
            band,
            frame: 0,
        })
    }

    /// Allocates from this thread's heap (overflow when full).
    pub fn alloc(&mut self, size: u32) -> Offset {
        self.heap.alloc(size)
    }

    /// Frees a block from [`Self::alloc`].
    pub fn free(&mut self, offset: Offset) {
        self.heap.free(offset);
    }

    /// Runs one frame through the barrier.
    ///
    /// Coordinator: publish the next frame, wake the workers, render its own
    /// band, then wait until every worker is done. Worker: sleep until
    /// woken, render its band, signal completion.
    pub fn render_frame<R: BandRenderer + ?Sized>(&mut self, renderer: &mut R) -> FrameOutcome {
        if self.coordinator {
            self.frame += 1;
            self.barrier.dispatch(self.frame);
            self.render_band(renderer, self.frame);
            self.barrier.wait_all();
            return FrameOutcome::Rendered { frame: self.frame };
        }

        match self.barrier.wait_for_work(self.index) {
            WorkerSignal::Render { frame } => {
                self.frame = frame;
                self.render_band(renderer, frame);
                self.barrier.complete(self.index);
                FrameOutcome::Rendered { frame }
            }
            WorkerSignal::Shutdown => FrameOutcome::Shutdown,
        }
    }

    /// Tells every worker to leave its loop. Coordinator only.
    ///
    /// # Panics
    ///
    /// Panics on a worker context.
    pub fn signal_shutdown(&self) {
        assert!(self.coordinator, "only the coordinator can shut the pool down");
        self.barrier.shutdown();
    }

    /// Thread index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Pool size.
    #[must_use]
    pub const fn threads(&self) -> u32 {
        self.threads
    }

    /// True for thread 0.
    #[must_use]
    pub const fn is_coordinator(&self) -> bool {
        self.coordinator
    }

    /// Rows this thread renders.
    #[must_use]
    pub const fn band(&self) -> RowBand {
        self.band
    }

    /// Last frame rendered.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// The render surface.
    #[must_use]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// This thread's heap.
    pub fn heap(&mut self) -> &mut ThreadHeap {
        &mut self.heap
    }

    /// Walk of this thread's heap.
    #[must_use]
    pub fn heap_report(&self) -> HeapReport {
        self.heap.report()
    }

    fn render_band<R: BandRenderer + ?Sized>(&mut self, renderer: &mut R, frame: u64) {
        renderer.render_band(BandTarget {
            surface: &self.surface,
            band: self.band,
            frame,
            thread: self.index,
            heap: &mut self.heap,
        });
    }
}
