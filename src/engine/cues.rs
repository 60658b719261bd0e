//! Cue tracking — which movement cue the player should be doing now.
//!
//! Purely a display aid. Cues never influence clip scheduling or capture;
//! the tracker just answers "current cue" and "next cue" against the
//! playback clock for whatever cue list the session has active.

use crate::chart::ActionCue;

/// Lookup over the active section's cue list.
#[derive(Debug, Default)]
pub struct CueTracker {
    cues: Vec<ActionCue>,
}

impl CueTracker {
    pub fn new() -> Self {
        Self { cues: Vec::new() }
    }

    /// Replace the active cue list. Called on section enter and on a
    /// mid-verse difficulty switch. Cues are kept sorted by time.
    pub fn set_cues(&mut self, cues: &[ActionCue]) {
        self.cues = cues.to_vec();
        self.cues.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Drop all cues. Sections without cue lists clear the display.
    pub fn clear(&mut self) {
        self.cues.clear();
    }

    /// The cue in effect at `now`: greatest cue time <= now.
    pub fn current(&self, now: f64) -> Option<&ActionCue> {
        self.cues.iter().rev().find(|cue| cue.time <= now)
    }

    /// The next cue after `now`, if any.
    pub fn upcoming(&self, now: f64) -> Option<&ActionCue> {
        self.cues.iter().find(|cue| cue.time > now)
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}
