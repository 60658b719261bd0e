//! Session engine — countdown, playback, capture, and teardown for one
//! guided choreography session.
//!
//! The [`SessionController`] owns every moving part: the master clock,
//! the pattern scheduler, capture windows and frame streaming, the
//! feedback channel, and the on-screen notice state. Everything advances
//! from a single `step` driven by the host loop; all timing decisions are
//! taken against the clock snapshot read at the top of the step.

pub mod capture;
pub mod config;
pub mod cues;
pub mod notice;
pub mod scheduler;
pub mod section;

pub use capture::{CaptureWindowManager, FrameSample, FrameStreamer};
pub use config::EngineConfig;
pub use cues::CueTracker;
pub use notice::NoticeBoard;
pub use scheduler::PatternScheduler;
pub use section::SectionClock;

use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::camera::CameraFeed;
use crate::chart::{DifficultyLevel, Section, SongChart};
use crate::clip::ClipLibrary;
use crate::clock::MasterClock;
use crate::net::{ChannelState, FeedbackChannel, InboundMessage, Judgment, NetConfig};

/// Host loop poll period.
const STEP_INTERVAL: Duration = Duration::from_millis(5);
/// Section banner lifetime.
const SECTION_BANNER_TTL: Duration = Duration::from_secs(8);
/// Difficulty-tied notices stay up longer than plain banners.
const LEVEL_NOTICE_TTL: Duration = Duration::from_secs(12);

/// Commands from outside the engine loop (UI thread, signal handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Tear the session down now.
    Stop,
    /// Voice prompt opened; hold playback under the overlay.
    VoiceInterrupt,
    /// Voice prompt closed; resume playback.
    VoiceResume,
}

/// Sender half — clone this for signal handlers and UI threads.
pub type ControlSender = mpsc::Sender<ControlEvent>;

/// Receiver half — held by the session controller.
pub struct ControlReceiver {
    rx: mpsc::Receiver<ControlEvent>,
}

impl ControlReceiver {
    /// Non-blocking poll for the next control event.
    pub fn poll(&self) -> Option<ControlEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain all pending control events.
    pub fn drain(&self) -> Vec<ControlEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a new control channel pair.
pub fn control_channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = mpsc::channel();
    (tx, ControlReceiver { rx })
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Countdown,
    Armed,
    Playing,
    Completed,
    ForceStopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Countdown => "countdown",
            Phase::Armed => "armed",
            Phase::Playing => "playing",
            Phase::Completed => "completed",
            Phase::ForceStopped => "force-stopped",
        };
        f.write_str(name)
    }
}

/// Per-grade judgment counts for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgmentTally {
    pub soso: u64,
    pub good: u64,
    pub perfect: u64,
}

impl JudgmentTally {
    pub fn record(&mut self, grade: Judgment) {
        match grade {
            Judgment::Soso => self.soso += 1,
            Judgment::Good => self.good += 1,
            Judgment::Perfect => self.perfect += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.soso + self.good + self.perfect
    }
}

/// What a finished session looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub frames_sent: u64,
    pub judgments: JudgmentTally,
    pub played_secs: f64,
    pub completed: bool,
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionExit {
    /// The track played to its end.
    Completed(SessionSummary),
    /// The backend never acknowledged the session.
    Abandoned,
    /// Stopped by the player or the host process.
    ForcedStop,
}

/// Errors starting a session.
#[derive(Debug)]
pub enum SessionError {
    /// The feedback channel could not open its sockets.
    Channel(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Channel(e) => write!(f, "feedback channel setup failed: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Orchestrates one session from countdown to teardown.
pub struct SessionController<C: MasterClock> {
    chart: SongChart,
    config: EngineConfig,
    clock: C,
    camera: Box<dyn CameraFeed>,
    channel: FeedbackChannel,
    control: ControlReceiver,
    section_clock: SectionClock,
    scheduler: PatternScheduler,
    windows: CaptureWindowManager,
    streamer: FrameStreamer,
    cues: CueTracker,
    notices: NoticeBoard,
    phase: Phase,
    begun: bool,
    session_id: String,
    countdown_deadline: Option<Instant>,
    countdown_last_shown: Option<u64>,
    abandon_at: Option<Instant>,
    voice_overlay: bool,
    last_step: Option<Instant>,
    judgments: JudgmentTally,
}

impl<C: MasterClock> SessionController<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chart: SongChart,
        library: ClipLibrary,
        level: DifficultyLevel,
        config: EngineConfig,
        net: NetConfig,
        clock: C,
        camera: Box<dyn CameraFeed>,
        control: ControlReceiver,
    ) -> Self {
        let section_clock = SectionClock::new(&chart.section_info);
        let scheduler = PatternScheduler::new(&chart, library, level, &config);
        let windows = CaptureWindowManager::new(&config);
        let streamer = FrameStreamer::new(&config);
        let notices = NoticeBoard::new(&config);
        Self {
            chart,
            clock,
            camera,
            channel: FeedbackChannel::new(net),
            control,
            section_clock,
            scheduler,
            windows,
            streamer,
            cues: CueTracker::new(),
            notices,
            config,
            phase: Phase::Idle,
            begun: false,
            session_id: new_session_id(),
            countdown_deadline: None,
            countdown_last_shown: None,
            abandon_at: None,
            voice_overlay: false,
            last_step: None,
            judgments: JudgmentTally::default(),
        }
    }

    /// Open the feedback channel and start the camera. The countdown
    /// begins in `step` once the backend acks the handshake; playback
    /// follows once the countdown elapses.
    pub fn begin(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.begun {
            log::warn!("session already started, ignoring begin");
            return Ok(());
        }
        self.channel
            .connect(&self.session_id, now)
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        self.camera.start();
        self.begun = true;
        log::info!("session {} waiting for the backend", self.session_id);
        Ok(())
    }

    /// Advance the session by one poll. Returns the exit reason once the
    /// session is over; afterwards further steps are inert.
    pub fn step(&mut self, now: Instant) -> Option<SessionExit> {
        if matches!(self.phase, Phase::Completed | Phase::ForceStopped) {
            return None;
        }
        let wall_dt = self
            .last_step
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last_step = Some(now);

        // A stop request wins over anything else queued this step
        for event in self.control.drain() {
            match event {
                ControlEvent::Stop => {
                    log::info!("stop requested");
                    self.teardown();
                    self.phase = Phase::ForceStopped;
                    return Some(SessionExit::ForcedStop);
                }
                ControlEvent::VoiceInterrupt => self.voice_interrupt(),
                ControlEvent::VoiceResume => self.voice_resume(now),
            }
        }

        for msg in self.channel.poll(now) {
            match msg {
                InboundMessage::Feedback(event) => {
                    log::debug!(
                        "judgment {} for frame at {:.2}",
                        event.grade,
                        event.timestamp
                    );
                    self.judgments.record(event.grade);
                    self.notices.show_judgment(event.grade, now);
                }
                InboundMessage::Level(decision) => {
                    self.apply_level_decision(decision.next_level, now)
                }
                // poll() consumes handshake acks itself
                InboundMessage::Ready => {}
            }
        }

        // The degraded-link line tracks the channel: up while the backend
        // is away, whether pre-ack or mid-session, dropped on recovery.
        // A finished session keeps its board clear.
        let waiting = self.begun
            && !matches!(self.phase, Phase::Completed | Phase::ForceStopped)
            && !self.channel.is_connected();
        self.notices.set_link_down(waiting);

        let exit = match self.phase {
            Phase::Completed | Phase::ForceStopped => None,
            Phase::Idle => self.step_idle(now),
            Phase::Countdown => self.step_countdown(now),
            Phase::Armed | Phase::Playing => self.step_playing(now, wall_dt),
        };
        if exit.is_some() {
            return exit;
        }

        self.notices.sweep(now);
        None
    }

    /// Block on the step loop until the session ends. For hosts that have
    /// no loop of their own.
    pub fn run(&mut self) -> Result<SessionExit, SessionError> {
        self.begin(Instant::now())?;
        loop {
            if let Some(exit) = self.step(Instant::now()) {
                return Ok(exit);
            }
            std::thread::sleep(STEP_INTERVAL);
        }
    }

    /// Wait out the handshake. The countdown is gated on the backend's
    /// ack; a backend that never answers abandons the session instead.
    fn step_idle(&mut self, now: Instant) -> Option<SessionExit> {
        if !self.begun {
            return None;
        }
        if let Some(at) = self.abandon_at {
            if now >= at {
                log::warn!("abandoning session {}, backend never answered", self.session_id);
                self.teardown();
                self.phase = Phase::ForceStopped;
                return Some(SessionExit::Abandoned);
            }
            return None;
        }

        if self.channel.is_connected() {
            self.countdown_deadline = Some(now + Duration::from_secs(self.config.countdown_secs));
            self.phase = Phase::Countdown;
            log::info!(
                "session {} counting down {}s",
                self.session_id,
                self.config.countdown_secs
            );
            return None;
        }

        if let Some(waited) = self.channel.never_connected_for(now) {
            if waited >= self.config.connect_timeout() {
                log::warn!("no backend ack after {waited:?}");
                self.notices
                    .post("backend unreachable, ending session", self.config.abandon_delay(), now);
                self.abandon_at = Some(now + self.config.abandon_delay());
            }
        }
        None
    }

    fn step_countdown(&mut self, now: Instant) -> Option<SessionExit> {
        let Some(deadline) = self.countdown_deadline else {
            return None;
        };
        let remaining = deadline.saturating_duration_since(now);
        if remaining > Duration::ZERO {
            let secs = remaining.as_secs_f64().ceil() as u64;
            if self.countdown_last_shown != Some(secs) {
                self.countdown_last_shown = Some(secs);
                self.notices
                    .post(format!("starting in {secs}"), Duration::from_millis(1100), now);
                log::info!("starting in {secs}");
            }
            return None;
        }
        self.arm(now);
        None
    }

    /// Arm capture and start playback, in that order, within one step.
    fn arm(&mut self, _now: Instant) {
        self.phase = Phase::Armed;
        self.windows.arm(self.chart.segment_info.verse1cam);
        self.windows.arm(self.chart.segment_info.verse2cam);
        self.section_clock.reset();
        log::info!(
            "session {} armed with {} capture windows",
            self.session_id,
            self.windows.pending_count()
        );
        self.clock.play();
        self.phase = Phase::Playing;
        log::info!("playback started");
    }

    fn step_playing(&mut self, now: Instant, wall_dt: f64) -> Option<SessionExit> {
        if self.voice_overlay {
            // Clock, clips, and capture all hold under the overlay
            return None;
        }

        let t = self.clock.position_secs();

        if let Some(section) = self.section_clock.update(t) {
            self.enter_section(section, now);
        }

        for window in self.windows.drain_due(t) {
            log::info!(
                "capture window open {:.2} .. {:.2}",
                window.start_time,
                window.end_time
            );
            self.streamer.start(window, now);
        }

        if let Some(sample) = self.streamer.tick(t, now, self.camera.as_mut()) {
            self.channel
                .send_frame(sample.sequence_index, sample.audio_timestamp, &sample.frame.data);
        }

        self.scheduler.tick(wall_dt);

        if self.clock.ended() {
            log::info!("track complete at {t:.2}s");
            self.teardown();
            self.phase = Phase::Completed;
            return Some(SessionExit::Completed(SessionSummary {
                session_id: self.session_id.clone(),
                frames_sent: self.channel.frames_sent(),
                judgments: self.judgments,
                played_secs: t,
                completed: true,
            }));
        }
        None
    }

    fn enter_section(&mut self, section: Section, now: Instant) {
        log::info!("entering {section}");
        self.scheduler.enter_section(section);
        self.refresh_cues();
        if section == Section::Verse2 {
            // enter_section above already applied any pending decision,
            // so the encouragement matches the level actually in effect
            let text = match self.scheduler.level() {
                DifficultyLevel::Level1 => "verse 2: keep it steady",
                DifficultyLevel::Level2 => "verse 2: step it up",
                DifficultyLevel::Level3 => "verse 2: all out",
            };
            self.notices.post(text, LEVEL_NOTICE_TTL, now);
        } else {
            self.notices.post(section.to_string(), SECTION_BANNER_TTL, now);
        }
    }

    fn apply_level_decision(&mut self, next: DifficultyLevel, now: Instant) {
        log::info!("backend decided {next}");
        self.scheduler.level_decision(next);
        if self.section_clock.current() == Some(Section::Verse2) {
            // Cue lists differ per level, refresh alongside the ring swap
            self.refresh_cues();
        }
        self.notices
            .post(format!("difficulty: {next}"), LEVEL_NOTICE_TTL, now);
    }

    fn refresh_cues(&mut self) {
        let Some(section) = self.section_clock.current() else {
            self.cues.clear();
            return;
        };
        match self.chart.cues_for(section, self.scheduler.level()) {
            Some(cues) => self.cues.set_cues(cues),
            None => self.cues.clear(),
        }
    }

    fn voice_interrupt(&mut self) {
        if self.phase != Phase::Playing || self.voice_overlay {
            log::debug!("voice interrupt ignored in phase {}", self.phase);
            return;
        }
        self.voice_overlay = true;
        self.clock.pause();
        self.scheduler.pause();
        log::info!("voice overlay up, playback held");
    }

    fn voice_resume(&mut self, now: Instant) {
        if !self.voice_overlay {
            return;
        }
        self.voice_overlay = false;
        self.clock.play();
        self.scheduler.resume();
        self.streamer.realign(now);
        log::info!("voice overlay down, playback resumed");
    }

    /// Release everything. Safe to call more than once; the end envelope
    /// goes out only while the channel is still up.
    fn teardown(&mut self) {
        self.streamer.stop();
        self.windows.cancel_all();
        self.camera.stop();
        self.channel.send_session_end();
        self.channel.disconnect();
        self.clock.pause();
        self.notices.clear();
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Replace the generated session id. Only meaningful before `begin`.
    pub fn set_session_id(&mut self, id: impl Into<String>) {
        self.session_id = id.into();
    }

    pub fn current_section(&self) -> Option<Section> {
        self.section_clock.current()
    }

    pub fn current_clip(&self) -> Option<&str> {
        self.scheduler.current_key()
    }

    /// Playback position inside the current clip, in seconds.
    pub fn clip_position(&self) -> Option<f64> {
        self.scheduler.clip_position()
    }

    pub fn level(&self) -> DifficultyLevel {
        self.scheduler.level()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn frames_sent(&self) -> u64 {
        self.channel.frames_sent()
    }

    pub fn judgments(&self) -> JudgmentTally {
        self.judgments
    }

    /// Live notice lines for the display.
    pub fn notices(&self) -> Vec<&str> {
        self.notices.lines()
    }

    /// Judgment currently flashing on the display.
    pub fn judgment(&self) -> Option<Judgment> {
        self.notices.judgment()
    }

    /// Cue the player should be doing right now.
    pub fn current_cue(&self) -> Option<&crate::chart::ActionCue> {
        self.cues.current(self.clock.position_secs())
    }

    pub fn voice_overlay(&self) -> bool {
        self.voice_overlay
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutable clock access, for hosts that drive a simulated clock.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

fn new_session_id() -> String {
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("sess-{epoch_ms}")
}
