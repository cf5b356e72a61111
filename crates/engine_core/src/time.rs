//! Frame timing for the render loop.

/// Tracks simulated time from caller-supplied frame deltas.
///
/// The renderer is driven by whoever owns the loop, so time only advances
/// through [`FrameClock::advance`]; no wall clock is read here.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    elapsed: f32,
    delta: f32,
    frame_count: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new frame that lasted `dt` seconds. Negative deltas count as zero.
    pub fn advance(&mut self, dt: f32) {
        self.delta = dt.max(0.0);
        self.elapsed += self.delta;
        self.frame_count += 1;
    }

    /// Delta time of the current frame in seconds.
    pub fn delta_seconds(&self) -> f32 {
        self.delta
    }

    /// Total elapsed time in seconds.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames per second implied by the last delta.
    pub fn fps(&self) -> f32 {
        if self.delta > 0.0 {
            1.0 / self.delta
        } else {
            0.0
        }
    }
}

/// Fixed-cadence accumulator that fires at most once per tick.
///
/// The backlog is capped at one interval so a long stall yields a single
/// step rather than a burst.
#[derive(Debug, Clone)]
pub struct FixedStep {
    interval: f32,
    accumulator: f32,
}

impl FixedStep {
    /// Step every `interval` seconds. The first tick always fires.
    pub fn new(interval: f32) -> Self {
        let interval = interval.max(f32::EPSILON);
        Self {
            interval,
            accumulator: interval,
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    /// Add `dt` seconds and report whether a step is due, consuming it.
    pub fn tick(&mut self, dt: f32) -> bool {
        let backlog = self.accumulator + dt.max(0.0);
        if backlog > self.interval * 2.0 {
            log::trace!("FixedStep dropping {:.3}s of backlog", backlog - self.interval * 2.0);
        }
        self.accumulator = backlog.min(self.interval * 2.0);
        if self.accumulator >= self.interval {
            self.accumulator = (self.accumulator - self.interval).min(self.interval);
            true
        } else {
            false
        }
    }

    /// Forget accumulated time; the next tick fires again.
    pub fn reset(&mut self) {
        self.accumulator = self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_accumulates_deltas() {
        let mut clock = FrameClock::new();
        clock.advance(0.5);
        clock.advance(0.25);
        clock.advance(-1.0);
        assert_eq!(clock.frame_count(), 3);
        assert!((clock.elapsed_seconds() - 0.75).abs() < 1e-6);
        assert_eq!(clock.delta_seconds(), 0.0);
        assert_eq!(clock.fps(), 0.0);
    }

    #[test]
    fn fixed_step_fires_on_cadence() {
        let mut step = FixedStep::new(0.25);
        assert!(step.tick(0.0));
        let fired: Vec<bool> = (0..6).map(|_| step.tick(0.093_75)).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn fixed_step_stall_yields_single_step() {
        let mut step = FixedStep::new(0.25);
        assert!(step.tick(0.0));
        assert!(step.tick(10.0));
        // Backlog capped at one interval: the next small tick fires once more,
        // then the cadence resumes.
        assert!(step.tick(0.01));
        assert!(!step.tick(0.01));
    }
}
