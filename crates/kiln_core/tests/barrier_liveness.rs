//! Frame barrier liveness with four threads on one sync array.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use kiln_core::{band_for, FrameBarrier, Offset, SharedBuffer, WorkerSignal};

const THREADS: u32 = 4;
const TIMEOUT: Duration = Duration::from_secs(10);

fn barrier() -> FrameBarrier {
    let buffer = Arc::new(SharedBuffer::new(256));
    FrameBarrier::new(&buffer, Offset::new(8), Offset::new(32), THREADS)
}

#[test]
fn coordinator_wait_terminates() {
    let barrier = barrier();

    let workers: Vec<_> = (1..THREADS)
        .map(|i| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                assert_eq!(barrier.wait_for_work(i), WorkerSignal::Render { frame: 1 });
                barrier.complete(i);
            })
        })
        .collect();

    let (done_tx, done_rx) = bounded(1);
    let coordinator = {
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.dispatch(1);
            barrier.wait_all();
            done_tx.send(()).expect("test receiver alive");
        })
    };

    done_rx
        .recv_timeout(TIMEOUT)
        .expect("coordinator wait loop did not terminate");
    coordinator.join().expect("coordinator panicked");
    for w in workers {
        w.join().expect("worker panicked");
    }
    for i in 0..THREADS {
        assert_eq!(barrier.cell_state(i), 0);
    }
}

#[test]
fn many_frames_then_shutdown() {
    const FRAMES: u64 = 500;
    const ROWS: u32 = 90;

    let barrier = barrier();
    let buffer = Arc::new(SharedBuffer::new(ROWS * 8));

    let workers: Vec<_> = (1..THREADS)
        .map(|i| {
            let barrier = barrier.clone();
            let rows = Arc::clone(&buffer);
            thread::spawn(move || {
                let band = band_for(ROWS, THREADS, i);
                let mut rendered = 0u64;
                while let WorkerSignal::Render { frame } = barrier.wait_for_work(i) {
                    for row in band.start..band.end {
                        rows.write(Offset::new(row * 8), frame);
                    }
                    rendered += 1;
                    barrier.complete(i);
                }
                rendered
            })
        })
        .collect();

    let (done_tx, done_rx) = bounded(1);
    let coordinator = {
        let barrier = barrier.clone();
        let rows = Arc::clone(&buffer);
        thread::spawn(move || {
            let own = band_for(ROWS, THREADS, 0);
            for frame in 1..=FRAMES {
                barrier.dispatch(frame);
                for row in own.start..own.end {
                    rows.write(Offset::new(row * 8), frame);
                }
                barrier.wait_all();
                for row in 0..ROWS {
                    assert_eq!(rows.read::<u64>(Offset::new(row * 8)), frame);
                }
            }
            barrier.shutdown();
            done_tx.send(()).expect("test receiver alive");
        })
    };

    done_rx
        .recv_timeout(TIMEOUT * 3)
        .expect("frame loop stalled");
    coordinator.join().expect("coordinator panicked");
    for w in workers {
        assert_eq!(w.join().expect("worker panicked"), FRAMES);
    }
}
