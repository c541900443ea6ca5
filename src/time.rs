use std::time::{Duration, Instant};

/// Wall-clock frame timer. Deltas are clamped so a stalled frame (window drag, breakpoint)
/// does not fast-forward cadences and animations.
pub struct Time {
    start: Instant,
    last: Instant,
    pub delta: Duration,
}

const MAX_DELTA: Duration = Duration::from_millis(250);

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO }
    }
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = (now - self.last).min(MAX_DELTA);
        self.last = now;
    }
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}
