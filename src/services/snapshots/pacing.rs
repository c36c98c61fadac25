// File: src/services/snapshots/pacing.rs
use std::time::Duration;
use tracing::warn;

/// Pause between scroll increments, shared by every snapshot of one run.
///
/// Only ever grows: once a render race shows the page cannot keep up, the slower
/// pace is kept for the rest of the run.
#[derive(Debug, Clone)]
pub struct ScrollPacing {
    delay: Duration,
    step: Duration,
}

impl ScrollPacing {
    pub fn new(initial: Duration, step: Duration) -> Self {
        Self {
            delay: initial,
            step,
        }
    }

    pub fn current(&self) -> Duration {
        self.delay
    }

    pub fn slow_down(&mut self) -> Duration {
        self.delay += self.step;
        warn!("Scroll delay raised to {:?} for the rest of the run", self.delay);
        self.delay
    }
}
