//! Choreo — a playback-synchronized choreography engine for guided dance sessions.

pub mod camera;
pub mod chart;
pub mod clip;
pub mod clock;
pub mod engine;
pub mod net;
