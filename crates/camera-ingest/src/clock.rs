use std::{thread, time::Duration};

/// Source of blocking delays for retry and warm-up pacing.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}
