//! Engine configuration — timing constants loaded from ~/.choreo/engine.yaml.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine timing configuration loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Camera sampling rate during capture windows, frames per second.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Slack before a clip's loop length at which the boundary counts as
    /// reached, in seconds.
    #[serde(default = "default_loop_epsilon")]
    pub loop_epsilon: f64,
    /// Clip position after a loop-boundary restart, in seconds.
    #[serde(default = "default_restart_offset")]
    pub restart_offset: f64,
    /// A capture window firing later than `end - late_guard` is skipped.
    #[serde(default = "default_late_guard")]
    pub late_guard: f64,
    /// Countdown before playback starts, in whole seconds.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
    /// How long the feedback handshake may take before the session is
    /// abandoned, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Delay between the abandonment notice and the exit, in milliseconds.
    #[serde(default = "default_abandon_delay_ms")]
    pub abandon_delay_ms: u64,
    /// How long one judgment stays displayed, in milliseconds.
    #[serde(default = "default_judgment_ttl_ms")]
    pub judgment_ttl_ms: u64,
}

fn default_frame_rate() -> u32 {
    15
}

fn default_loop_epsilon() -> f64 {
    0.02
}

fn default_restart_offset() -> f64 {
    0.06
}

fn default_late_guard() -> f64 {
    0.08
}

fn default_countdown_secs() -> u64 {
    5
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_abandon_delay_ms() -> u64 {
    1200
}

fn default_judgment_ttl_ms() -> u64 {
    1000
}

impl EngineConfig {
    /// Load config from the standard path (~/.choreo/engine.yaml).
    /// Returns None if the file doesn't exist (graceful fallback).
    pub fn load() -> Option<Self> {
        let home = dirs::home_dir()?;
        let path = home.join(".choreo").join("engine.yaml");
        let content = std::fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    /// Wall-clock interval between captured frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn abandon_delay(&self) -> Duration {
        Duration::from_millis(self.abandon_delay_ms)
    }

    pub fn judgment_ttl(&self) -> Duration {
        Duration::from_millis(self.judgment_ttl_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            loop_epsilon: default_loop_epsilon(),
            restart_offset: default_restart_offset(),
            late_guard: default_late_guard(),
            countdown_secs: default_countdown_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            abandon_delay_ms: default_abandon_delay_ms(),
            judgment_ttl_ms: default_judgment_ttl_ms(),
        }
    }
}
