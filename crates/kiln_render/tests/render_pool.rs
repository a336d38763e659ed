//! End-to-end frames through a real thread pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kiln_core::GrowableArray;
use kiln_render::{
    BandTarget, EngineConfig, EngineError, RenderPool, Rgba8, Surface, ThreadContext,
};

fn config(threads: u32, width: u32, height: u32) -> EngineConfig {
    let mut c = EngineConfig::default();
    c.threads.count = threads;
    c.surface.width = width;
    c.surface.height = height;
    c.memory.thread_heap_bytes = 16 << 10;
    c.memory.overflow_bytes = 64 << 10;
    c.memory.max_alloc_bytes = 16 << 10;
    c.assets.glyph_atlas_bytes = 256;
    c.assets.texture_bytes = 256;
    c.assets.texture_index_entries = 4;
    c
}

/// Encodes (thread, frame) into every pixel of the band.
fn stamp(t: BandTarget<'_>) {
    let color = Rgba8::new(t.thread as u8, t.frame as u8, 0, 255);
    t.surface.fill_band(t.band, color);
}

#[test]
fn test_every_row_rendered_once_per_frame() {
    let cfg = config(4, 16, 13);
    let mut pool = RenderPool::spawn(&cfg, |_| stamp).unwrap();
    let bands = kiln_core::split_rows(13, 4);

    for frame in 1..=20u64 {
        let stats = pool.render_frame();
        assert_eq!(stats.frame, frame);

        let surface = pool.surface();
        for (thread, band) in bands.iter().enumerate() {
            for y in band.start..band.end {
                for x in [0, 7, 15] {
                    assert_eq!(
                        surface.pixel(x, y),
                        Rgba8::new(thread as u8, frame as u8, 0, 255),
                        "pixel ({x}, {y}) frame {frame}"
                    );
                }
            }
        }
    }

    let reports = pool.shutdown().unwrap();
    assert_eq!(reports.len(), 4);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.index, i as u32);
        assert_eq!(report.frames, 20);
    }
}

#[test]
fn test_single_thread_pool() {
    let cfg = config(1, 8, 4);
    let mut pool = RenderPool::spawn(&cfg, |_| stamp).unwrap();
    assert_eq!(pool.threads(), 1);
    pool.render_frame();
    pool.render_frame();
    assert_eq!(pool.surface().pixel(7, 3), Rgba8::new(0, 2, 0, 255));
    assert_eq!(pool.stats().frames, 2);

    let reports = pool.shutdown().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].frames, 2);
}

#[test]
fn test_scratch_allocations_do_not_leak() {
    let cfg = config(3, 32, 9);
    let mut pool = RenderPool::spawn(&cfg, |_| {
        |t: BandTarget<'_>| {
            let mut row: GrowableArray<Rgba8> = GrowableArray::new(t.heap);
            for x in 0..t.surface.width() {
                row.push(t.heap, Rgba8::new(x as u8, t.frame as u8, 7, 255));
            }
            let pixels = row.to_vec();
            for y in t.band.start..t.band.end {
                t.surface.write_row(y, &pixels);
            }
            row.free(t.heap);
        }
    })
    .unwrap();

    for _ in 0..50 {
        pool.render_frame();
    }
    assert_eq!(pool.surface().pixel(31, 8), Rgba8::new(31, 50, 7, 255));

    let reports = pool.shutdown().unwrap();
    for report in reports {
        assert_eq!(report.frames, 50);
        assert_eq!(report.heap.used_blocks, 0, "thread {}", report.index);
        assert_eq!(report.heap.free_blocks, 1, "thread {}", report.index);
    }
}

#[test]
fn test_presenter_sees_finished_frame() {
    let cfg = config(2, 4, 4);
    let mut pool = RenderPool::spawn(&cfg, |_| stamp).unwrap();
    let presented = Arc::new(AtomicU64::new(0));

    let seen = Arc::clone(&presented);
    let mut presenter = move |frame: u64, surface: &Surface| {
        assert_eq!(surface.pixel(0, 0), Rgba8::new(0, frame as u8, 0, 255));
        assert_eq!(surface.pixel(3, 3), Rgba8::new(1, frame as u8, 0, 255));
        seen.store(frame, Ordering::SeqCst);
    };
    for _ in 0..5 {
        let stats = pool.render_and_present(&mut presenter);
        assert!(stats.total_us >= stats.render_us);
    }
    assert_eq!(presented.load(Ordering::SeqCst), 5);
}

#[test]
fn test_drop_joins_workers() {
    let cfg = config(4, 8, 8);
    let built = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&built);
    let pool = RenderPool::spawn(&cfg, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        stamp
    })
    .unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 4);
    drop(pool);
}

#[test]
fn test_invalid_config_rejected_before_spawn() {
    let cfg = config(5, 8, 4);
    let err = RenderPool::spawn(&cfg, |_| stamp).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)), "{err}");
}

#[test]
fn test_coordinator_allocates_between_frames() {
    let cfg = config(2, 8, 8);
    let mut pool = RenderPool::spawn(&cfg, |_| stamp).unwrap();
    let ctx: &mut ThreadContext = pool.coordinator_mut();
    let block = ctx.alloc(512);
    assert!(ctx.heap().owns(block));
    pool.render_frame();
    pool.coordinator_mut().free(block);
    let reports = pool.shutdown().unwrap();
    assert_eq!(reports[0].heap.used_blocks, 0);
}

#[test]
fn test_worker_panic_during_startup_is_reported() {
    let cfg = config(4, 8, 8);
    let err = RenderPool::spawn(&cfg, |thread| {
        assert_ne!(thread, 2, "renderer for thread 2 refused to build");
        stamp
    })
    .unwrap_err();
    assert!(matches!(err, EngineError::WorkerPanicked(2)), "{err}");
}
