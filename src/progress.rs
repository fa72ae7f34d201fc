//! Progress sink: percentage + phase label reported to the host.
//!
//! The engine guarantees percentages are non-decreasing within one top-level
//! call; `MonotonicProgress` enforces that over any inner sink.

/// Receives progress updates. Implementations must tolerate being called
/// with the same percentage repeatedly.
pub trait ProgressSink {
    /// `percent` is 0-100; `label` is a short human-readable phase name.
    fn update(&mut self, percent: u8, label: &str);
}

/// Sink for callers that did not supply a callback.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&mut self, _percent: u8, _label: &str) {}
}

/// Clamps reported percentages so they never decrease. Reduce passes each
/// report 0-100 for their own groups; the clamp turns that into one
/// non-decreasing sequence per top-level call.
pub struct MonotonicProgress<'a> {
    inner: &'a mut dyn ProgressSink,
    high_water: u8,
}

impl<'a> MonotonicProgress<'a> {
    pub fn new(inner: &'a mut dyn ProgressSink) -> Self {
        Self { inner, high_water: 0 }
    }
}

impl ProgressSink for MonotonicProgress<'_> {
    fn update(&mut self, percent: u8, label: &str) {
        let clamped = percent.clamp(self.high_water, 100);
        self.high_water = clamped;
        self.inner.update(clamped, label);
    }
}

/// Maps an inner 0-100 range into the `[lo, hi]` segment of an outer sink,
/// so multi-phase operations can report one continuous scale.
pub struct ScaledProgress<'a> {
    inner: &'a mut dyn ProgressSink,
    lo: u8,
    hi: u8,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a mut dyn ProgressSink, lo: u8, hi: u8) -> Self {
        debug_assert!(lo <= hi && hi <= 100);
        Self { inner, lo, hi }
    }
}

impl ProgressSink for ScaledProgress<'_> {
    fn update(&mut self, percent: u8, label: &str) {
        let span = (self.hi - self.lo) as u32;
        let mapped = self.lo as u32 + (percent.min(100) as u32 * span) / 100;
        self.inner.update(mapped as u8, label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<u8>);

    impl ProgressSink for Recorder {
        fn update(&mut self, percent: u8, _label: &str) {
            self.0.push(percent);
        }
    }

    #[test]
    fn test_monotonic_never_decreases() {
        let mut rec = Recorder(Vec::new());
        {
            let mut mono = MonotonicProgress::new(&mut rec);
            for p in [0, 50, 100, 0, 30, 100] {
                mono.update(p, "pass");
            }
        }
        assert_eq!(rec.0, vec![0, 50, 100, 100, 100, 100]);
    }

    #[test]
    fn test_scaled_maps_into_segment() {
        let mut rec = Recorder(Vec::new());
        {
            let mut scaled = ScaledProgress::new(&mut rec, 20, 60);
            scaled.update(0, "x");
            scaled.update(50, "x");
            scaled.update(100, "x");
        }
        assert_eq!(rec.0, vec![20, 40, 60]);
    }

    #[test]
    fn test_caps_at_hundred() {
        let mut rec = Recorder(Vec::new());
        {
            let mut mono = MonotonicProgress::new(&mut rec);
            mono.update(100, "done");
            mono.update(100, "done");
        }
        assert_eq!(rec.0, vec![100, 100]);
    }
}
