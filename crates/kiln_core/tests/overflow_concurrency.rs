//! Overflow allocator under concurrent threads.

use std::sync::{Arc, Barrier};
use std::thread;

use kiln_core::{Offset, OverflowAllocator, Region, SharedBuffer};

const THREADS: usize = 8;
const ROUNDS: usize = 400;

fn overflow(size: u32) -> OverflowAllocator {
    let buffer = Arc::new(SharedBuffer::new(64 + size));
    OverflowAllocator::attach(&buffer, &Region::new("overflow", Offset::new(64), size, 64), 256)
        .expect("overflow region")
}

#[test]
fn live_blocks_never_overlap() {
    let alloc = overflow(1 << 20);
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let alloc = alloc.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                let mut kept = Vec::new();
                for i in 0..ROUNDS {
                    let size = 1 + ((t * 31 + i * 17) % 200) as u32;
                    let p = alloc.alloc(size);
                    if i % 3 == 0 {
                        alloc.free(p);
                    } else {
                        kept.push((p.get(), size));
                    }
                }
                kept
            })
        })
        .collect();

    let mut live: Vec<(u32, u32)> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("worker panicked"))
        .collect();
    live.sort_unstable();
    for pair in live.windows(2) {
        let (a, a_size) = pair[0];
        let (b, _) = pair[1];
        assert!(a + a_size <= b, "blocks at {a:#x} (+{a_size}) and {b:#x} overlap");
    }
}

#[test]
fn payloads_survive_concurrent_traffic() {
    let alloc = overflow(1 << 20);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let alloc = alloc.clone();
            thread::spawn(move || {
                let buffer = Arc::clone(alloc.buffer());
                let tag = t as u8 + 1;
                let mut mine = Vec::new();
                for i in 0..ROUNDS {
                    let p = alloc.alloc(24);
                    buffer.fill(p, 24, tag);
                    mine.push(p);
                    if i % 2 == 1 {
                        alloc.free(mine.swap_remove(0));
                    }
                }
                for p in &mine {
                    assert!(buffer.snapshot(*p, 24).iter().all(|&b| b == tag));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker panicked");
    }

    let stats = alloc.stats();
    assert!(stats.bumped <= stats.capacity);
    assert!(stats.free_blocks > 0);
}
