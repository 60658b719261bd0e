//! Pattern clips — reference-movement loop metadata and the clip transport.
//!
//! A pattern clip is a short loopable reference-movement recording with a
//! native tempo and a loop length in beats. The library resolves clip keys
//! named by a chart's pattern rings; the transport models the playing clip:
//! a position advanced at a playback rate, restartable at a fixed offset.

use serde::{Deserialize, Serialize};

/// Metadata of one loopable reference-movement clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternClip {
    pub key: String,
    pub source_ref: String,
    pub reference_bpm: f64,
    pub loop_beats: u32,
}

impl PatternClip {
    /// Real-time length of one loop at the clip's native tempo.
    pub fn loop_length_secs(&self) -> f64 {
        60.0 / self.reference_bpm * self.loop_beats as f64
    }
}

/// The set of clips a session can play, looked up by key.
#[derive(Debug, Clone, Default)]
pub struct ClipLibrary {
    clips: Vec<PatternClip>,
}

impl ClipLibrary {
    /// Empty library.
    pub fn new() -> Self {
        Self { clips: Vec::new() }
    }

    /// Builtin reference clips: the fixed intro/break loop plus the four
    /// movement patterns.
    pub fn builtin() -> Self {
        let mut lib = Self::new();
        lib.insert(clip("intro", "intro.mp4", 100.0, 8));
        lib.insert(clip("break", "break.mp4", 100.0, 8));
        lib.insert(clip("P1", "P1.mp4", 98.6, 16));
        lib.insert(clip("P2", "P2.mp4", 98.3, 16));
        lib.insert(clip("P3", "P3.mp4", 99.0, 16));
        lib.insert(clip("P4", "P4.mp4", 99.0, 16));
        lib
    }

    /// Load a clip list from a YAML file.
    pub fn load(path: &std::path::Path) -> Result<Self, crate::chart::ChartError> {
        use crate::chart::ChartError;
        let content = std::fs::read_to_string(path)?;
        let clips: Vec<PatternClip> = serde_yaml::from_str(&content)?;
        for c in &clips {
            if !c.reference_bpm.is_finite() || c.reference_bpm <= 0.0 || c.loop_beats == 0 {
                return Err(ChartError::Invalid(format!(
                    "clip {} has bpm {} / {} beats",
                    c.key, c.reference_bpm, c.loop_beats
                )));
            }
        }
        Ok(Self { clips })
    }

    /// Add a clip, replacing any existing clip with the same key.
    pub fn insert(&mut self, clip: PatternClip) {
        if let Some(existing) = self.clips.iter_mut().find(|c| c.key == clip.key) {
            *existing = clip;
        } else {
            self.clips.push(clip);
        }
    }

    /// Look up a clip by key.
    pub fn get(&self, key: &str) -> Option<&PatternClip> {
        self.clips.iter().find(|c| c.key == key)
    }

    /// Number of clips.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn clip(key: &str, source: &str, bpm: f64, beats: u32) -> PatternClip {
    PatternClip {
        key: key.to_string(),
        source_ref: source.to_string(),
        reference_bpm: bpm,
        loop_beats: beats,
    }
}

/// The currently loaded clip and its playback position.
#[derive(Debug, Clone)]
struct ActiveClip {
    key: String,
    rate: f64,
    loop_length: f64,
    position: f64,
}

/// Playback transport for the active reference clip.
///
/// Stands in for the looping video element: one clip loaded at a time,
/// position advanced at `rate` times real time while playing. Play/pause
/// state survives clip switches.
#[derive(Debug, Clone)]
pub struct ClipTransport {
    active: Option<ActiveClip>,
    playing: bool,
}

impl ClipTransport {
    /// New transport with nothing loaded, paused.
    pub fn new() -> Self {
        Self {
            active: None,
            playing: false,
        }
    }

    /// Load a clip at the given playback rate, starting from `offset`.
    /// The play/pause state is preserved across the switch.
    pub fn load(&mut self, clip: &PatternClip, rate: f64, offset: f64) {
        self.active = Some(ActiveClip {
            key: clip.key.clone(),
            rate,
            loop_length: clip.loop_length_secs(),
            position: offset.max(0.0),
        });
    }

    /// Rewind the active clip to `offset`.
    pub fn restart(&mut self, offset: f64) {
        if let Some(active) = self.active.as_mut() {
            active.position = offset.max(0.0);
        }
    }

    /// Advance the clip position by `wall_dt` seconds of real time.
    pub fn advance(&mut self, wall_dt: f64) {
        if !self.playing {
            return;
        }
        if let Some(active) = self.active.as_mut() {
            active.position += active.rate * wall_dt;
        }
    }

    /// Whether the clip position has reached its loop boundary, within
    /// `epsilon` seconds of slack.
    pub fn past_loop_boundary(&self, epsilon: f64) -> bool {
        match &self.active {
            Some(active) => active.position >= active.loop_length - epsilon,
            None => false,
        }
    }

    /// Key of the loaded clip.
    pub fn current_key(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.key.as_str())
    }

    /// Position of the loaded clip in seconds.
    pub fn position(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.position)
    }

    /// Loop length of the loaded clip in seconds.
    pub fn loop_length(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.loop_length)
    }

    /// Playback rate of the loaded clip.
    pub fn rate(&self) -> Option<f64> {
        self.active.as_ref().map(|a| a.rate)
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Unload the clip and stop.
    pub fn clear(&mut self) {
        self.active = None;
        self.playing = false;
    }
}

impl Default for ClipTransport {
    fn default() -> Self {
        Self::new()
    }
}
