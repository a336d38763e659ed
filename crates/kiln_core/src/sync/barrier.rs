//! # Frame Barrier
//!
//! Fan-out / fan-in over one sync cell per thread.
//!
//! ```text
//!   coordinator (0)             worker i (1..n)
//!   ───────────────             ───────────────
//!   publish frame number
//!   cell[i] = 1, notify  ─────► wait while cell[i] == 0
//!   render own band             render band
//!   wait while cell[i] == 1 ◄── cell[i] = 0, notify
//!   composite
//! ```
//!
//! Cells carry no payload: frame inputs and outputs live in planned regions.
//! Cell 0 belongs to the coordinator and is never signalled.
//!
//! The control region holds the quit flag (`+0`) and the current frame
//! number (`+8`, `u64`). Both are written before the cells are raised.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::constants::{CELL_BUSY, CELL_IDLE};
use crate::memory::{Offset, SharedBuffer};

use super::futex;

const QUIT: u32 = 0;
const FRAME: u32 = 8;

/// Bytes the barrier needs in the control region.
pub const CONTROL_BYTES: u32 = 16;

/// What a woken worker should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// Render this frame's band, then call [`FrameBarrier::complete`].
    Render {
        /// Frame number published by the coordinator.
        frame: u64,
    },
    /// The pool is shutting down; leave the run loop.
    Shutdown,
}

/// A view of the sync cells and control words, shared by every thread.
#[derive(Debug, Clone)]
pub struct FrameBarrier {
    buffer: Arc<SharedBuffer>,
    control: Offset,
    cells: Offset,
    threads: u32,
}

impl FrameBarrier {
    /// Attaches to `threads` cells at `cells` and the control words at
    /// `control`.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero, an offset is not 8-aligned, or the
    /// ranges fall outside `buffer`.
    #[must_use]
    pub fn new(buffer: &Arc<SharedBuffer>, control: Offset, cells: Offset, threads: u32) -> Self {
        assert!(threads > 0, "frame barrier needs at least one thread");
        assert!(control.get() % 8 == 0, "control words must be 8-aligned");
        assert!(cells.get() % 4 == 0, "sync cells must be 4-aligned");
        assert!(control.add(CONTROL_BYTES).get() <= buffer.len(), "control region outside buffer");
        assert!(cells.add(threads * 4).get() <= buffer.len(), "sync region outside buffer");
        Self {
            buffer: Arc::clone(buffer),
            control,
            cells,
            threads,
        }
    }

    /// Threads taking part, coordinator included.
    #[inline]
    #[must_use]
    pub const fn threads(&self) -> u32 {
        self.threads
    }

    // -------------------------------------------------------------------------
    // Coordinator side
    // -------------------------------------------------------------------------

    /// Publishes `frame` and wakes every worker.
    pub fn dispatch(&self, frame: u64) {
        self.buffer.write(self.control.add(FRAME), frame);
        self.raise_all();
    }

    /// Blocks until every worker has completed.
    pub fn wait_all(&self) {
        for index in 1..self.threads {
            let cell = self.cell(index);
            while cell.load(Ordering::Acquire) != CELL_IDLE {
                futex::wait(cell, CELL_BUSY);
            }
        }
    }

    /// Sets the quit flag and wakes every worker so it can exit.
    pub fn shutdown(&self) {
        self.buffer
            .cell(self.control.add(QUIT))
            .store(1, Ordering::Release);
        self.raise_all();
    }

    // -------------------------------------------------------------------------
    // Worker side
    // -------------------------------------------------------------------------

    /// Blocks until the coordinator raises cell `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is 0 or out of range.
    #[must_use]
    pub fn wait_for_work(&self, index: u32) -> WorkerSignal {
        assert!(index > 0, "the coordinator does not wait for work");
        let cell = self.cell(index);
        while cell.load(Ordering::Acquire) == CELL_IDLE {
            futex::wait(cell, CELL_IDLE);
        }
        if self.is_shutdown() {
            WorkerSignal::Shutdown
        } else {
            WorkerSignal::Render { frame: self.frame() }
        }
    }

    /// Lowers cell `index` and wakes the coordinator.
    pub fn complete(&self, index: u32) {
        let cell = self.cell(index);
        cell.store(CELL_IDLE, Ordering::Release);
        futex::wake_one(cell);
    }

    // -------------------------------------------------------------------------
    // Shared
    // -------------------------------------------------------------------------

    /// Frame number of the last dispatch.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.buffer.read(self.control.add(FRAME))
    }

    /// True once [`Self::shutdown`] ran.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.buffer
            .cell(self.control.add(QUIT))
            .load(Ordering::Acquire)
            != 0
    }

    /// Current value of cell `index`.
    #[must_use]
    pub fn cell_state(&self, index: u32) -> u32 {
        self.cell(index).load(Ordering::Acquire)
    }

    fn raise_all(&self) {
        for index in 1..self.threads {
            let cell = self.cell(index);
            cell.store(CELL_BUSY, Ordering::Release);
            futex::wake_one(cell);
        }
    }

    #[inline]
    fn cell(&self, index: u32) -> &AtomicU32 {
        assert!(index < self.threads, "sync cell {index} of {}", self.threads);
        self.buffer.cell(self.cells.add(index * 4))
    }
}
