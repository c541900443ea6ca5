use serde::Deserialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RiseConfig {
    #[serde(default = "RiseConfig::default_duration")]
    pub duration: f32,
    /// Delay added per instance index.
    #[serde(default = "RiseConfig::default_stagger")]
    pub stagger: f32,
    #[serde(default = "RiseConfig::default_max_stagger")]
    pub max_stagger: f32,
}

impl RiseConfig {
    const fn default_duration() -> f32 {
        0.9
    }

    const fn default_stagger() -> f32 {
        0.0004
    }

    const fn default_max_stagger() -> f32 {
        2.5
    }
}

impl Default for RiseConfig {
    fn default() -> Self {
        Self {
            duration: Self::default_duration(),
            stagger: Self::default_stagger(),
            max_stagger: Self::default_max_stagger(),
        }
    }
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

#[derive(Debug, Clone, Copy)]
struct RiseEntry {
    index: u32,
    start: f32,
}

/// One-shot grow-in wave. Entries are queued in start order and leave the queue once they
/// reach full height, so a tick only touches instances that are in flight.
#[derive(Debug, Clone, Default)]
pub struct RiseScheduler {
    config: RiseConfig,
    clock: f32,
    queue: VecDeque<RiseEntry>,
}

impl RiseScheduler {
    pub fn new(config: RiseConfig) -> Self {
        Self { config, clock: 0.0, queue: VecDeque::new() }
    }

    pub fn config(&self) -> RiseConfig {
        self.config
    }

    pub fn schedule_wave(&mut self, count: usize) {
        self.clock = 0.0;
        self.queue.clear();
        self.queue.reserve(count);
        let max_stagger = self.config.max_stagger.max(0.0);
        for index in 0..count {
            let start = (index as f32 * self.config.stagger).min(max_stagger);
            self.queue.push_back(RiseEntry { index: index as u32, start });
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn is_animating(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Advances the wave clock by `dt` and hands every started instance its eased progress.
    ///
    /// Nothing moves while `hold` is set. Returns true when any progress value was written.
    pub fn advance(&mut self, dt: f32, hold: bool, mut write: impl FnMut(usize, f32)) -> bool {
        if hold || self.queue.is_empty() || !(dt > 0.0) {
            return false;
        }
        self.clock += dt;
        let clock = self.clock;
        let duration = self.config.duration.max(f32::EPSILON);
        let started = self.queue.partition_point(|entry| entry.start <= clock);
        if started == 0 {
            return false;
        }
        let finished = self.queue.partition_point(|entry| entry.start + duration <= clock);
        for entry in self.queue.range(..finished) {
            write(entry.index as usize, 1.0);
        }
        for entry in self.queue.range(finished..started) {
            write(entry.index as usize, ease_out_cubic((clock - entry.start) / duration));
        }
        self.queue.drain(..finished);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RiseConfig {
        RiseConfig { duration: 1.0, stagger: 0.1, max_stagger: 10.0 }
    }

    #[test]
    fn ease_out_cubic_hits_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!(ease_out_cubic(0.5) > 0.5);
    }

    #[test]
    fn staggered_wave_progresses_monotonically_to_one() {
        let mut scheduler = RiseScheduler::new(config());
        scheduler.schedule_wave(5);
        let mut progress = vec![0.0f32; 5];
        for _ in 0..30 {
            let before = progress.clone();
            scheduler.advance(0.05, false, |i, p| progress[i] = p);
            for (old, new) in before.iter().zip(progress.iter()) {
                assert!(new >= old);
            }
        }
        // 1.5s elapsed: index 4 starts at 0.4 and finishes at 1.4.
        assert!(progress.iter().all(|p| *p == 1.0), "{progress:?}");
        assert!(!scheduler.is_animating());
    }

    #[test]
    fn later_indices_start_later() {
        let mut scheduler = RiseScheduler::new(config());
        scheduler.schedule_wave(3);
        let mut progress = vec![0.0f32; 3];
        scheduler.advance(0.15, false, |i, p| progress[i] = p);
        assert!(progress[0] > progress[1]);
        assert_eq!(progress[2], 0.0);
    }

    #[test]
    fn hold_freezes_the_clock() {
        let mut scheduler = RiseScheduler::new(config());
        scheduler.schedule_wave(2);
        let mut writes = 0;
        for _ in 0..10 {
            assert!(!scheduler.advance(0.5, true, |_, _| writes += 1));
        }
        assert_eq!(writes, 0);
        assert_eq!(scheduler.in_flight(), 2);
        let mut first = 0.0;
        scheduler.advance(0.25, false, |i, p| {
            if i == 0 {
                first = p
            }
        });
        assert!((first - ease_out_cubic(0.25)).abs() < 1e-6);
    }

    #[test]
    fn stagger_is_capped() {
        let mut scheduler = RiseScheduler::new(RiseConfig { duration: 0.5, stagger: 1.0, max_stagger: 2.0 });
        scheduler.schedule_wave(100);
        let mut done = 0usize;
        scheduler.advance(2.5, false, |_, p| {
            if p == 1.0 {
                done += 1
            }
        });
        assert_eq!(done, 100);
        assert!(!scheduler.is_animating());
    }
}
