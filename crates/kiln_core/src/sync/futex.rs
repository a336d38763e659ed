//! # Atomic Wait / Notify
//!
//! Address-keyed parking on a `u32` cell, backed by `parking_lot_core`.
//!
//! ## Safety Note
//!
//! `parking_lot_core` marks its park/unpark entry points unsafe because a key
//! must not collide with a key used by another protocol. Keys here are the
//! addresses of shared buffer cells, which nothing else parks on.

#![allow(unsafe_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

#[inline]
fn key(cell: &AtomicU32) -> usize {
    (cell as *const AtomicU32) as usize
}

/// Sleeps while `cell == expected`.
///
/// Returns immediately if the value already differs. The comparison is
/// repeated under the parking lot's bucket lock, so a [`wake_one`] or
/// [`wake_all`] issued between the caller's check and the sleep is never
/// lost. Spurious returns are possible; callers loop.
pub fn wait(cell: &AtomicU32, expected: u32) {
    if cell.load(Ordering::Acquire) != expected {
        return;
    }
    // SAFETY: the key is this cell's address (see module note); the validate
    // closure only reads the atomic and the other callbacks do nothing.
    unsafe {
        parking_lot_core::park(
            key(cell),
            || cell.load(Ordering::Acquire) == expected,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
        );
    }
}

/// Wakes at most one thread parked on `cell`. Returns true if one woke.
pub fn wake_one(cell: &AtomicU32) -> bool {
    // SAFETY: see module note; the callback does nothing.
    let result = unsafe { parking_lot_core::unpark_one(key(cell), |_| DEFAULT_UNPARK_TOKEN) };
    result.unparked_threads > 0
}

/// Wakes every thread parked on `cell`. Returns how many woke.
pub fn wake_all(cell: &AtomicU32) -> usize {
    // SAFETY: see module note.
    unsafe { parking_lot_core::unpark_all(key(cell), DEFAULT_UNPARK_TOKEN) }
}
