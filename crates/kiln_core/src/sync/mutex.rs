//! # Spin-then-Park Mutex
//!
//! A three-state lock living in one `u32` cell of the shared buffer:
//!
//! ```text
//! 0  unlocked
//! 1  locked, no waiters
//! 2  locked, waiters may be parked
//! ```
//!
//! The lock protects no Rust data; it brackets a critical section over bytes
//! in the buffer. Unlock happens when the [`SpinMutexGuard`] drops.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::constants::SPIN_LIMIT;

use super::futex;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// A view of a lock cell.
#[derive(Debug, Clone, Copy)]
pub struct SpinMutex<'a> {
    state: &'a AtomicU32,
}

impl<'a> SpinMutex<'a> {
    /// Wraps a zero-initialised cell.
    #[inline]
    #[must_use]
    pub const fn new(state: &'a AtomicU32) -> Self {
        Self { state }
    }

    /// Acquires the lock, spinning briefly and then parking.
    #[must_use = "the lock is released when the guard drops"]
    pub fn lock(self) -> SpinMutexGuard<'a> {
        for _ in 0..SPIN_LIMIT {
            if self
                .state
                .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinMutexGuard { state: self.state };
            }
            std::hint::spin_loop();
        }

        // Slow path. Stay in state 2 once contended so the unlocker knows to wake.
        while self.state.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            futex::wait(self.state, CONTENDED);
        }
        SpinMutexGuard { state: self.state }
    }

    /// One acquisition attempt, no spinning.
    #[must_use]
    pub fn try_lock(self) -> Option<SpinMutexGuard<'a>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinMutexGuard { state: self.state })
    }

    /// True while some thread holds the lock.
    #[must_use]
    pub fn is_locked(self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }
}

/// Holds the lock; dropping it unlocks.
#[derive(Debug)]
pub struct SpinMutexGuard<'a> {
    state: &'a AtomicU32,
}

impl Drop for SpinMutexGuard<'_> {
    fn drop(&mut self) {
        if self.state.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            futex::wake_one(self.state);
        }
    }
}
