//! Frame timing.

use std::fmt;

/// Timings of one frame, in microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Dispatch to last band complete.
    pub render_us: u64,
    /// Time spent in the presenter.
    pub present_us: u64,
    /// Whole frame.
    pub total_us: u64,
}

/// Totals for one timed phase of a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseTotals {
    /// Sum over all recorded frames.
    pub sum_us: u64,
    /// Shortest sample, `None` until the first one.
    pub shortest_us: Option<u64>,
    /// Longest sample.
    pub longest_us: u64,
}

impl PhaseTotals {
    fn add(&mut self, us: u64) {
        self.sum_us = self.sum_us.saturating_add(us);
        self.shortest_us = Some(self.shortest_us.map_or(us, |s| s.min(us)));
        self.longest_us = self.longest_us.max(us);
    }

    /// Mean over `frames` samples in milliseconds.
    #[must_use]
    pub fn mean_ms(&self, frames: u64) -> Option<f64> {
        (frames > 0).then(|| us_to_ms(self.sum_us) / frames as f64)
    }
}

/// Running totals over many frames.
#[derive(Clone, Debug)]
pub struct RenderLoopStats {
    /// Frame budget the totals are judged against.
    pub budget_us: u64,
    /// Frames recorded.
    pub frames: u64,
    /// Frames whose total went past `budget_us`.
    pub over_budget: u64,
    /// Whole frame.
    pub total: PhaseTotals,
    /// Band rendering.
    pub render: PhaseTotals,
    /// Presenter.
    pub present: PhaseTotals,
}

impl RenderLoopStats {
    /// Empty totals for a `budget_us` frame budget.
    #[must_use]
    pub const fn new(budget_us: u64) -> Self {
        Self {
            budget_us,
            frames: 0,
            over_budget: 0,
            total: PhaseTotals {
                sum_us: 0,
                shortest_us: None,
                longest_us: 0,
            },
            render: PhaseTotals {
                sum_us: 0,
                shortest_us: None,
                longest_us: 0,
            },
            present: PhaseTotals {
                sum_us: 0,
                shortest_us: None,
                longest_us: 0,
            },
        }
    }

    /// Adds one frame.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames += 1;
        self.total.add(stats.total_us);
        self.render.add(stats.render_us);
        self.present.add(stats.present_us);

        if stats.total_us > self.budget_us {
            self.over_budget += 1;
            tracing::warn!(
                frame = stats.frame,
                total_us = stats.total_us,
                budget_us = self.budget_us,
                "frame exceeded budget"
            );
        }
    }

    /// Mean frame time in milliseconds, `None` before the first frame.
    #[must_use]
    pub fn mean_frame_ms(&self) -> Option<f64> {
        self.total.mean_ms(self.frames)
    }

    /// Frames per second of accumulated frame time. `None` until some time
    /// has been recorded.
    #[must_use]
    pub fn fps(&self) -> Option<f64> {
        (self.total.sum_us > 0).then(|| self.frames as f64 * 1e6 / self.total.sum_us as f64)
    }

    /// Share of frames over budget, in `[0, 1]`.
    #[must_use]
    pub fn over_budget_share(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.over_budget as f64 / self.frames as f64)
    }
}

impl Default for RenderLoopStats {
    fn default() -> Self {
        Self::new(16_666)
    }
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

impl fmt::Display for RenderLoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(mean), Some(shortest)) = (self.mean_frame_ms(), self.total.shortest_us) else {
            return write!(f, "no frames, {:.3} ms budget", us_to_ms(self.budget_us));
        };
        write!(
            f,
            "{} frames in {:.3}..{:.3} ms, mean {mean:.3} ms",
            self.frames,
            us_to_ms(shortest),
            us_to_ms(self.total.longest_us),
        )?;
        if let Some(fps) = self.fps() {
            write!(f, " ({fps:.1} fps)")?;
        }
        write!(
            f,
            ", render {:.3} ms, present {:.3} ms, {} over {:.3} ms budget",
            self.render.mean_ms(self.frames).unwrap_or_default(),
            self.present.mean_ms(self.frames).unwrap_or_default(),
            self.over_budget,
            us_to_ms(self.budget_us),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame: u64, render_us: u64, present_us: u64, total_us: u64) -> FrameStats {
        FrameStats {
            frame,
            render_us,
            present_us,
            total_us,
        }
    }

    #[test]
    fn test_empty_stats() {
        let stats = RenderLoopStats::new(1000);
        assert_eq!(stats.mean_frame_ms(), None);
        assert_eq!(stats.fps(), None);
        assert_eq!(stats.over_budget_share(), None);
        assert_eq!(stats.total.shortest_us, None);
        assert_eq!(stats.to_string(), "no frames, 1.000 ms budget");
    }

    #[test]
    fn test_record_tracks_budget() {
        let mut stats = RenderLoopStats::new(10_000);
        for i in 0..100 {
            stats.record(frame(i, 5_000, 1_000, 9_000 + i * 50));
        }

        assert_eq!(stats.frames, 100);
        assert_eq!(stats.total.shortest_us, Some(9_000));
        assert_eq!(stats.total.longest_us, 13_950);
        // 9000 + i*50 > 10000 for i > 20
        assert_eq!(stats.over_budget, 79);
        assert_eq!(stats.over_budget_share(), Some(0.79));
        assert_eq!(stats.render.sum_us, 500_000);
        assert_eq!(stats.render.mean_ms(stats.frames), Some(5.0));
        assert_eq!(stats.present.mean_ms(stats.frames), Some(1.0));
        let fps = stats.fps().unwrap();
        assert!(fps > 80.0 && fps < 110.0);
    }

    #[test]
    fn test_zero_length_frames_have_no_rate() {
        let mut stats = RenderLoopStats::new(1000);
        stats.record(frame(0, 0, 0, 0));
        stats.record(frame(1, 0, 0, 0));
        assert_eq!(stats.mean_frame_ms(), Some(0.0));
        assert_eq!(stats.fps(), None);
        assert_eq!(stats.over_budget_share(), Some(0.0));
        assert_eq!(
            stats.to_string(),
            "2 frames in 0.000..0.000 ms, mean 0.000 ms, render 0.000 ms, present 0.000 ms, 0 over 1.000 ms budget"
        );
    }

    #[test]
    fn test_display_with_frames() {
        let mut stats = RenderLoopStats::new(2_000);
        stats.record(frame(0, 1_000, 500, 2_000));
        stats.record(frame(1, 2_000, 500, 3_000));
        assert_eq!(
            stats.to_string(),
            "2 frames in 2.000..3.000 ms, mean 2.500 ms (400.0 fps), render 1.500 ms, present 0.500 ms, 1 over 2.000 ms budget"
        );
    }
}
