/// Line counting for verbose progress reports.
use std::time::{Duration, Instant};

/// Counts lines and measures the gap since the previous one.
pub struct LineMetrics {
    lines: u64,
    last: Instant,
}

/// One progress sample, taken when a line arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSample {
    /// Lines seen so far, including this one: the count is taken after the
    /// line is recorded, so the first line reports 1 rather than 0.
    pub lines: u64,
    /// Time since the previous line (or since counting started).
    pub gap: Duration,
}

impl LineMetrics {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(last: Instant) -> Self {
        Self { lines: 0, last }
    }

    /// Record a line and reset the gap baseline.
    pub fn record(&mut self) -> LineSample {
        self.record_at(Instant::now())
    }

    fn record_at(&mut self, now: Instant) -> LineSample {
        self.lines += 1;
        let gap = now.saturating_duration_since(self.last);
        self.last = now;
        LineSample {
            lines: self.lines,
            gap,
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }
}

impl Default for LineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
