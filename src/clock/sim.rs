//! Simulated master clock — manually advanced, fully deterministic.

use super::MasterClock;

/// A master clock driven by explicit [`advance`](SimClock::advance) calls.
///
/// Used by tests and headless demo runs: the caller decides how much time
/// passes per step, so every scenario is reproducible.
#[derive(Debug, Clone)]
pub struct SimClock {
    position: f64,
    duration: f64,
    playing: bool,
    ended: bool,
}

impl SimClock {
    /// New stopped clock at position 0.
    pub fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            duration: duration.max(0.0),
            playing: false,
            ended: false,
        }
    }

    /// Advance by `dt` seconds of simulated time. Ignored while paused.
    /// Clamps at the track end and raises the ended flag there.
    pub fn advance(&mut self, dt: f64) {
        if !self.playing || dt <= 0.0 {
            return;
        }
        self.position += dt;
        if self.position >= self.duration {
            self.position = self.duration;
            self.playing = false;
            self.ended = true;
        }
    }
}

impl MasterClock for SimClock {
    fn position_secs(&self) -> f64 {
        self.position
    }

    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn ended(&self) -> bool {
        self.ended
    }

    fn play(&mut self) {
        if !self.ended {
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, secs: f64) {
        self.position = secs.clamp(0.0, self.duration);
        if self.position < self.duration {
            self.ended = false;
        }
    }
}
