//! Capture windows and frame streaming.
//!
//! Windows armed from the chart fire when the playback clock crosses
//! their start. A fired window hands over to the [`FrameStreamer`],
//! which samples the camera on a wall-clock cadence while stamping each
//! frame with audio time, and shuts itself off the moment audio time
//! reaches the window end.

use std::time::{Duration, Instant};

use crate::camera::{CameraFeed, CameraFrame};
use crate::chart::CaptureWindow;
use crate::engine::config::EngineConfig;

/// Tolerance when comparing wall time against the frame cadence, so a
/// tick landing a hair early still captures.
const PACING_SLACK: Duration = Duration::from_millis(1);

/// Armed capture windows waiting for the playback clock.
#[derive(Debug)]
pub struct CaptureWindowManager {
    pending: Vec<CaptureWindow>,
    late_guard: f64,
}

impl CaptureWindowManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pending: Vec::new(),
            late_guard: config.late_guard,
        }
    }

    /// Register a window. Malformed windows are dropped here rather than
    /// poisoning the poll loop.
    pub fn arm(&mut self, window: CaptureWindow) {
        if !window.is_valid() {
            log::warn!(
                "dropping invalid capture window {} .. {}",
                window.start_time,
                window.end_time
            );
            return;
        }
        self.pending.push(window);
    }

    /// Windows whose start has passed. A window that would open with
    /// less than the late guard remaining is skipped outright, since a
    /// capture that short is useless to the judge.
    pub fn drain_due(&mut self, now: f64) -> Vec<CaptureWindow> {
        let late_guard = self.late_guard;
        let mut due = Vec::new();
        self.pending.retain(|window| {
            if now < window.start_time {
                return true;
            }
            if now >= window.end_time - late_guard {
                log::warn!(
                    "skipping capture window {} .. {}, opened too late at {now:.2}",
                    window.start_time,
                    window.end_time
                );
            } else {
                due.push(*window);
            }
            false
        });
        due
    }

    /// Drop every armed window. Used on teardown and forced stop.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// One captured camera frame tagged for transport.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub sequence_index: u64,
    pub audio_timestamp: f64,
    pub frame: CameraFrame,
}

#[derive(Debug)]
struct ActiveStream {
    window: CaptureWindow,
    next_seq: u64,
    last_mark: Instant,
}

/// Samples the camera at the configured frame rate while a window is open.
#[derive(Debug)]
pub struct FrameStreamer {
    interval: Duration,
    active: Option<ActiveStream>,
}

impl FrameStreamer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            interval: config.frame_interval(),
            active: None,
        }
    }

    /// Open a window. The pacing marker starts at `wall_now`, so the
    /// first frame goes out one interval later.
    pub fn start(&mut self, window: CaptureWindow, wall_now: Instant) {
        if self.active.is_some() {
            log::warn!("frame streamer restarted while a window was open");
        }
        self.active = Some(ActiveStream {
            window,
            next_seq: 0,
            last_mark: wall_now,
        });
    }

    /// Poll the streamer. Returns a frame when the cadence is due and the
    /// camera delivers; closes the stream once audio time reaches the
    /// window end, so no sample ever carries a timestamp at or past it.
    pub fn tick(
        &mut self,
        audio_now: f64,
        wall_now: Instant,
        camera: &mut dyn CameraFeed,
    ) -> Option<FrameSample> {
        let active = self.active.as_mut()?;

        if audio_now >= active.window.end_time {
            log::debug!(
                "capture window {} .. {} complete after {} frames",
                active.window.start_time,
                active.window.end_time,
                active.next_seq
            );
            self.active = None;
            return None;
        }

        if wall_now.saturating_duration_since(active.last_mark) + PACING_SLACK < self.interval {
            return None;
        }
        // Advance by the exact interval rather than snapping to wall_now,
        // so a late tick does not stretch the whole cadence.
        active.last_mark += self.interval;

        let frame = match camera.capture(audio_now) {
            Some(frame) => frame,
            None => {
                log::debug!("camera produced no frame at {audio_now:.3}");
                return None;
            }
        };

        let sample = FrameSample {
            sequence_index: active.next_seq,
            audio_timestamp: audio_now,
            frame,
        };
        active.next_seq += 1;
        Some(sample)
    }

    /// Move the pacing marker to `wall_now`. Called when playback resumes
    /// after a hold; without this every interval missed under the hold
    /// would be captured back-to-back.
    pub fn realign(&mut self, wall_now: Instant) {
        if let Some(active) = &mut self.active {
            active.last_mark = wall_now;
        }
    }

    /// Close the stream. Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        self.active = None;
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticCamera;

    fn window(start: f64, end: f64) -> CaptureWindow {
        CaptureWindow {
            start_time: start,
            end_time: end,
        }
    }

    fn manager() -> CaptureWindowManager {
        CaptureWindowManager::new(&EngineConfig::default())
    }

    #[test]
    fn window_fires_when_clock_crosses_start() {
        let mut mgr = manager();
        mgr.arm(window(48.47, 92.78));

        assert!(mgr.drain_due(40.0).is_empty());
        assert_eq!(mgr.pending_count(), 1);

        let due = mgr.drain_due(48.47);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start_time, 48.47);
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn window_opened_too_late_is_skipped() {
        let mut mgr = manager();
        mgr.arm(window(48.47, 92.78));

        // First poll after a long stall lands past the end
        assert!(mgr.drain_due(95.0).is_empty());
        assert_eq!(mgr.pending_count(), 0, "late window must not stay armed");
    }

    #[test]
    fn late_guard_bounds_the_skip() {
        // end - late_guard = 92.70 with the default 80ms guard
        let mut mgr = manager();
        mgr.arm(window(48.47, 92.78));
        assert!(mgr.drain_due(92.75).is_empty());

        let mut mgr = manager();
        mgr.arm(window(48.47, 92.78));
        assert_eq!(mgr.drain_due(92.0).len(), 1);
    }

    #[test]
    fn invalid_window_is_dropped_at_arm() {
        let mut mgr = manager();
        mgr.arm(window(10.0, 5.0));
        mgr.arm(window(f64::NAN, 20.0));
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn windows_fire_independently() {
        let mut mgr = manager();
        mgr.arm(window(48.47, 92.78));
        mgr.arm(window(153.73, 198.04));

        let due = mgr.drain_due(60.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start_time, 48.47);
        assert_eq!(mgr.pending_count(), 1);

        let due = mgr.drain_due(160.0);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].start_time, 153.73);
    }

    #[test]
    fn cancel_all_clears_pending() {
        let mut mgr = manager();
        mgr.arm(window(48.47, 92.78));
        mgr.arm(window(153.73, 198.04));
        mgr.cancel_all();
        assert_eq!(mgr.pending_count(), 0);
        assert!(mgr.drain_due(60.0).is_empty());
    }

    fn running_camera() -> SyntheticCamera {
        let mut camera = SyntheticCamera::new(7);
        camera.start();
        camera
    }

    #[test]
    fn first_frame_arrives_one_interval_after_start() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();
        streamer.start(window(48.47, 92.78), t0);

        assert!(streamer
            .tick(48.5, t0 + Duration::from_millis(10), &mut camera)
            .is_none());

        let sample = streamer
            .tick(48.54, t0 + Duration::from_millis(66), &mut camera)
            .unwrap();
        assert_eq!(sample.sequence_index, 0);
        assert_eq!(sample.audio_timestamp, 48.54);
        assert!(!sample.frame.data.is_empty());
    }

    #[test]
    fn sequence_is_strictly_increasing_from_zero() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();
        streamer.start(window(0.0, 100.0), t0);

        let mut seqs = Vec::new();
        for ms in (0..2000).step_by(5) {
            let audio = ms as f64 / 1000.0;
            if let Some(sample) = streamer.tick(audio, t0 + Duration::from_millis(ms as u64), &mut camera) {
                seqs.push(sample.sequence_index);
            }
        }
        // 2s at 15 fps
        assert!(seqs.len() >= 28 && seqs.len() <= 31, "got {} frames", seqs.len());
        for (i, seq) in seqs.iter().enumerate() {
            assert_eq!(*seq, i as u64);
        }
    }

    #[test]
    fn no_sample_at_or_past_window_end() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();
        streamer.start(window(0.0, 1.0), t0);

        let mut last_ts = 0.0;
        for ms in (0..1500).step_by(5) {
            let audio = ms as f64 / 1000.0;
            if let Some(sample) = streamer.tick(audio, t0 + Duration::from_millis(ms as u64), &mut camera) {
                last_ts = sample.audio_timestamp;
            }
        }
        assert!(last_ts < 1.0);
        assert!(!streamer.is_streaming(), "stream closes itself at end time");
    }

    #[test]
    fn late_tick_does_not_stretch_the_cadence() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();
        streamer.start(window(0.0, 100.0), t0);

        // Stalled 100ms before the first poll; frame 0 is late
        let s0 = streamer.tick(0.1, t0 + Duration::from_millis(100), &mut camera);
        assert_eq!(s0.unwrap().sequence_index, 0);

        // Marker moved to t0+66.7ms, not t0+100ms, so the next frame is
        // due at ~t0+133ms and the cadence catches back up
        let s1 = streamer.tick(0.14, t0 + Duration::from_millis(140), &mut camera);
        assert_eq!(s1.unwrap().sequence_index, 1);
    }

    #[test]
    fn stopped_camera_skips_the_sample() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = SyntheticCamera::new(7); // never started
        let t0 = Instant::now();
        streamer.start(window(0.0, 100.0), t0);

        assert!(streamer
            .tick(0.07, t0 + Duration::from_millis(70), &mut camera)
            .is_none());
        assert!(streamer.is_streaming());

        // Once the camera runs, frames resume with the next due slot
        camera.start();
        let sample = streamer.tick(0.14, t0 + Duration::from_millis(140), &mut camera);
        assert_eq!(sample.unwrap().sequence_index, 0);
    }

    #[test]
    fn realign_swallows_missed_intervals() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();
        streamer.start(window(0.0, 100.0), t0);

        let s0 = streamer.tick(0.07, t0 + Duration::from_millis(70), &mut camera);
        assert_eq!(s0.unwrap().sequence_index, 0);

        // A 2s hold would leave ~30 intervals owed; realigning forgives them
        let resumed = t0 + Duration::from_millis(2070);
        streamer.realign(resumed);
        assert!(streamer
            .tick(0.07, resumed + Duration::from_millis(10), &mut camera)
            .is_none());
        let s1 = streamer.tick(0.14, resumed + Duration::from_millis(70), &mut camera);
        assert_eq!(s1.unwrap().sequence_index, 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();
        streamer.start(window(0.0, 100.0), t0);

        streamer.stop();
        streamer.stop();
        assert!(!streamer.is_streaming());
        assert!(streamer
            .tick(0.5, t0 + Duration::from_millis(500), &mut camera)
            .is_none());
    }

    #[test]
    fn restart_resets_the_sequence() {
        let mut streamer = FrameStreamer::new(&EngineConfig::default());
        let mut camera = running_camera();
        let t0 = Instant::now();

        streamer.start(window(0.0, 1.0), t0);
        let first = streamer.tick(0.07, t0 + Duration::from_millis(70), &mut camera);
        assert_eq!(first.unwrap().sequence_index, 0);
        streamer.stop();

        streamer.start(window(2.0, 3.0), t0 + Duration::from_millis(200));
        let again = streamer.tick(2.1, t0 + Duration::from_millis(270), &mut camera);
        assert_eq!(again.unwrap().sequence_index, 0);
    }
}
