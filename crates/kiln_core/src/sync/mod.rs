//! # Thread Synchronization
//!
//! Everything here works on `u32` cells inside the shared buffer.
//!
//! ## The Problem
//!
//! ```text
//! Thread 0 (coordinator):  needs the whole surface rendered every frame
//! Threads 1..n (workers):  each own a band of rows, idle between frames
//!
//! Busy-waiting:  burns a core per idle worker
//! Channels:      payload copies and host allocation per frame
//! ```
//!
//! ## The Solution
//!
//! ```text
//! futex      park/unpark keyed on a cell's address
//! SpinMutex  short critical sections (overflow free list)
//! Barrier    one cell per thread, 0 = idle, 1 = busy
//! ```

mod barrier;
pub mod futex;
mod mutex;
mod split;

pub use barrier::{FrameBarrier, WorkerSignal, CONTROL_BYTES};
pub use mutex::{SpinMutex, SpinMutexGuard};
pub use split::{band_for, split_rows, RowBand};
