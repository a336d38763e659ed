//! # Render Pool
//!
//! A fixed pool of OS threads over one [`SharedMemory`]. Thread 0 is the
//! coordinator and runs on the caller's thread; threads `1..n` are spawned
//! workers that live until [`RenderPool::shutdown`].
//!
//! ## Startup
//!
//! ```text
//! caller                      worker i
//!   allocate shared memory
//!   init coordinator context
//!   spawn kiln-worker-i  ───▶  init context, build renderer
//!   wait on ready channel ◀──  send Ok(i) | Err((i, reason))
//!                              loop render_frame until Shutdown
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use kiln_core::{FrameBarrier, HeapReport};

use crate::config::EngineConfig;
use crate::context::{BandRenderer, FrameOutcome, SharedMemory, ThreadContext};
use crate::error::{EngineError, EngineResult};
use crate::layout::EngineLayout;
use crate::stats::{FrameStats, RenderLoopStats};
use crate::surface::Surface;

/// Receives the finished surface once per frame.
pub trait Presenter {
    /// Called on the coordinator after every band of `frame` is done.
    fn present(&mut self, frame: u64, surface: &Surface);
}

impl<F> Presenter for F
where
    F: FnMut(u64, &Surface),
{
    fn present(&mut self, frame: u64, surface: &Surface) {
        self(frame, surface);
    }
}

struct NoPresent;

impl Presenter for NoPresent {
    fn present(&mut self, _frame: u64, _surface: &Surface) {}
}

/// What a thread did before the pool stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Thread index; 0 is the coordinator.
    pub index: u32,
    /// Frames rendered.
    pub frames: u64,
    /// Heap walk at exit.
    pub heap: HeapReport,
}

type ReadyMessage = Result<u32, (u32, String)>;

/// The coordinator context, its renderer and the worker threads.
///
/// Dropping the pool without [`RenderPool::shutdown`] still stops and joins
/// the workers.
pub struct RenderPool<R: BandRenderer> {
    shared: SharedMemory,
    coordinator: ThreadContext,
    renderer: R,
    workers: Vec<(u32, JoinHandle<Option<WorkerReport>>)>,
    stats: RenderLoopStats,
    stopped: bool,
}

impl<R: BandRenderer> RenderPool<R> {
    /// Allocates the shared buffer, starts `threads.count - 1` workers and
    /// returns once every worker reported ready.
    ///
    /// `factory(i)` builds the renderer for thread `i`, on that thread.
    ///
    /// # Errors
    ///
    /// Configuration and layout errors, [`EngineError::Spawn`] if the OS
    /// refuses a thread, [`EngineError::WorkerInit`] if a worker context
    /// fails to build and [`EngineError::WorkerPanicked`] if a worker dies
    /// before reporting. Workers already started are stopped and joined
    /// before the error is returned.
    pub fn spawn<F>(config: &EngineConfig, factory: F) -> EngineResult<Self>
    where
        R: 'static,
        F: Fn(u32) -> R + Send + Sync + 'static,
    {
        let shared = SharedMemory::allocate(config)?;
        let threads = shared.layout().threads();
        let coordinator = ThreadContext::init(&shared, 0, threads, true)?;
        let factory = Arc::new(factory);

        let (ready_tx, ready_rx) = bounded::<ReadyMessage>(threads as usize);
        let mut workers = Vec::with_capacity(threads as usize - 1);

        for index in 1..threads {
            let spawned = spawn_worker(&shared, index, Arc::clone(&factory), ready_tx.clone());
            match spawned {
                Ok(handle) => workers.push((index, handle)),
                Err(err) => {
                    stop_workers(&shared.barrier(), workers);
                    return Err(err);
                }
            }
        }
        drop(ready_tx);

        for _ in 1..threads {
            let failure = match ready_rx.recv() {
                Ok(Ok(_)) => continue,
                Ok(Err((index, reason))) => EngineError::WorkerInit { index, reason },
                Err(_) => {
                    let panicked = stop_workers(&shared.barrier(), workers);
                    return Err(EngineError::WorkerPanicked(panicked.unwrap_or(0)));
                }
            };
            if let Some(index) = stop_workers(&shared.barrier(), workers) {
                tracing::error!(index, "worker panicked during startup");
            }
            return Err(failure);
        }

        let renderer = factory(0);
        tracing::info!(
            threads,
            width = config.surface.width,
            height = config.surface.height,
            bytes = shared.buffer().len(),
            "render pool started"
        );

        Ok(Self {
            shared,
            coordinator,
            renderer,
            workers,
            stats: RenderLoopStats::new(config.frame.budget_us),
            stopped: false,
        })
    }

    /// Renders one frame on every thread.
    pub fn render_frame(&mut self) -> FrameStats {
        self.render_and_present(&mut NoPresent)
    }

    /// Renders one frame, then hands the finished surface to `presenter`.
    pub fn render_and_present<P: Presenter + ?Sized>(&mut self, presenter: &mut P) -> FrameStats {
        let start = Instant::now();
        let FrameOutcome::Rendered { frame } = self.coordinator.render_frame(&mut self.renderer)
        else {
            unreachable!("the coordinator path never reports shutdown");
        };
        let rendered = start.elapsed();

        presenter.present(frame, self.coordinator.surface());
        let total = start.elapsed();

        let stats = FrameStats {
            frame,
            render_us: micros(rendered),
            present_us: micros(total - rendered),
            total_us: micros(total),
        };
        tracing::debug!(
            frame,
            render_us = stats.render_us,
            present_us = stats.present_us,
            "frame"
        );
        self.stats.record(stats);
        stats
    }

    /// Stops and joins every worker.
    ///
    /// Reports are ordered by thread index, coordinator first.
    ///
    /// # Errors
    ///
    /// [`EngineError::WorkerPanicked`] naming the first worker that panicked.
    pub fn shutdown(mut self) -> EngineResult<Vec<WorkerReport>> {
        self.stop()
    }

    /// The render surface.
    #[must_use]
    pub fn surface(&self) -> &Surface {
        self.coordinator.surface()
    }

    /// The shared buffer and its plan.
    #[must_use]
    pub fn shared(&self) -> &SharedMemory {
        &self.shared
    }

    /// The configuration the pool was built from.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.shared.config()
    }

    /// The region plan.
    #[must_use]
    pub fn layout(&self) -> &EngineLayout {
        self.shared.layout()
    }

    /// Frame totals so far.
    #[must_use]
    pub fn stats(&self) -> &RenderLoopStats {
        &self.stats
    }

    /// Pool size, coordinator included.
    #[must_use]
    pub const fn threads(&self) -> u32 {
        self.coordinator.threads()
    }

    /// Last frame rendered.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.coordinator.frame()
    }

    /// The coordinator's context, for allocations between frames.
    pub fn coordinator_mut(&mut self) -> &mut ThreadContext {
        &mut self.coordinator
    }

    /// The coordinator's renderer.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    fn stop(&mut self) -> EngineResult<Vec<WorkerReport>> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.stopped = true;
        self.coordinator.signal_shutdown();

        let mut reports = vec![WorkerReport {
            index: 0,
            frames: self.coordinator.frame(),
            heap: self.coordinator.heap_report(),
        }];
        let mut panicked = None;
        for (index, handle) in std::mem::take(&mut self.workers) {
            match handle.join() {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(_) => {
                    tracing::error!(index, "worker panicked");
                    panicked.get_or_insert(index);
                }
            }
        }

        tracing::info!(frames = self.coordinator.frame(), "render pool stopped");
        match panicked {
            Some(index) => Err(EngineError::WorkerPanicked(index)),
            None => Ok(reports),
        }
    }
}

impl<R: BandRenderer> Drop for RenderPool<R> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(%err, "render pool stopped with errors");
        }
    }
}

impl<R: BandRenderer> std::fmt::Debug for RenderPool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPool")
            .field("threads", &self.threads())
            .field("frame", &self.frame())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

fn spawn_worker<R, F>(
    shared: &SharedMemory,
    index: u32,
    factory: Arc<F>,
    ready: Sender<ReadyMessage>,
) -> EngineResult<JoinHandle<Option<WorkerReport>>>
where
    R: BandRenderer + 'static,
    F: Fn(u32) -> R + Send + Sync + 'static,
{
    let shared = shared.clone();
    thread::Builder::new()
        .name(format!("kiln-worker-{index}"))
        .spawn(move || {
            let threads = shared.layout().threads();
            let mut ctx = match ThreadContext::init(&shared, index, threads, false) {
                Ok(ctx) => ctx,
                Err(err) => {
                    report_ready(&ready, Err((index, err.to_string())));
                    return None;
                }
            };
            let mut renderer = factory(index);
            report_ready(&ready, Ok(index));
            drop(ready);

            let band = ctx.band();
            tracing::info!(index, rows = ?(band.start..band.end), "worker started");
            let mut frames = 0;
            while let FrameOutcome::Rendered { .. } = ctx.render_frame(&mut renderer) {
                frames += 1;
            }
            tracing::info!(index, frames, "worker stopped");

            Some(WorkerReport {
                index,
                frames,
                heap: ctx.heap_report(),
            })
        })
        .map_err(|source| EngineError::Spawn { index, source })
}

/// Sends a startup result to the spawning thread.
///
/// The receiver is gone once `spawn` has already failed on another worker;
/// that worker is about to be told to quit, so the result is only logged.
fn report_ready(ready: &Sender<ReadyMessage>, message: ReadyMessage) -> bool {
    match ready.send(message) {
        Ok(()) => true,
        Err(unsent) => {
            tracing::debug!(message = ?unsent.into_inner(), "render pool startup already abandoned");
            false
        }
    }
}

/// Signals quit and joins `workers`; returns the first that panicked.
fn stop_workers(
    barrier: &FrameBarrier,
    workers: Vec<(u32, JoinHandle<Option<WorkerReport>>)>,
) -> Option<u32> {
    barrier.shutdown();
    let mut panicked = None;
    for (index, handle) in workers {
        if handle.join().is_err() {
            panicked.get_or_insert(index);
        }
    }
    panicked
}

fn micros(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
