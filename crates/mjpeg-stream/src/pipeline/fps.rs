use std::time::Instant;

/// Weight of the previous estimate in the exponential moving average.
const SMOOTHING: f64 = 0.9;

/// Per-subscriber frame-rate tracking.
#[derive(Clone, Copy, Debug)]
pub struct StreamState {
    pub smoothed_fps: f64,
    pub prev_timestamp: Instant,
}

impl StreamState {
    pub fn new(start: Instant) -> Self {
        Self {
            smoothed_fps: 0.0,
            prev_timestamp: start,
        }
    }

    /// Fold the frame observed at `now` into the estimate and return it.
    ///
    /// Non-positive deltas leave the estimate untouched.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.prev_timestamp).as_secs_f64();
        if elapsed > 0.0 {
            let instantaneous = 1.0 / elapsed;
            self.smoothed_fps = SMOOTHING * self.smoothed_fps + (1.0 - SMOOTHING) * instantaneous;
        }
        self.prev_timestamp = now;
        self.smoothed_fps
    }

    /// Estimate rounded for display.
    pub fn display_fps(&self) -> i64 {
        self.smoothed_fps.round() as i64
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}
