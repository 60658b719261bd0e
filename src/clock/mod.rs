//! Master clock — audio playback position as the single source of truth.
//!
//! Every other timing in the engine derives from the master clock. The
//! session controller reads one position snapshot per step and hands plain
//! seconds down to the components; nothing else touches the clock. Two
//! implementations: [`TrackPlayer`] plays a real track through the audio
//! device, [`SimClock`] is manually advanced for tests and headless runs.

pub mod sim;
pub mod track;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub use sim::SimClock;
pub use track::TrackPlayer;

/// Read surface plus the play/pause control owned by the session controller.
pub trait MasterClock {
    /// Current playback position in seconds.
    fn position_secs(&self) -> f64;
    /// Track length in seconds.
    fn duration_secs(&self) -> f64;
    /// Whether the clock is currently advancing.
    fn is_playing(&self) -> bool;
    /// Whether the track has played to its end.
    fn ended(&self) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
    /// Jump to an absolute position in seconds.
    fn seek(&mut self, secs: f64);
}

/// Lock-free playhead shared between the audio callback and the run loop.
///
/// Position is stored as `f64` bits in an `AtomicU64`; all loads and stores
/// are `Relaxed` since a slightly stale read is harmless at tick cadence.
#[derive(Debug, Default)]
pub struct SharedPlayhead {
    position_bits: AtomicU64,
    playing: AtomicBool,
    ended: AtomicBool,
}

impl SharedPlayhead {
    #[inline]
    pub fn position_secs(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_position_secs(&self, secs: f64) {
        self.position_bits.store(secs.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    #[inline]
    pub fn ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_ended(&self) {
        self.ended.store(true, Ordering::Relaxed);
    }
}
