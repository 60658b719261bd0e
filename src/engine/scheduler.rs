//! Pattern scheduler — picks which choreography clip loops under the
//! current section and difficulty, and keeps it looping in time.
//!
//! Verse sections rotate through a ring of pattern clips, advancing one
//! slot whenever the active clip nears its loop boundary. Intro and break
//! play a single fixed clip that restarts in place. Difficulty changes
//! received outside verse2 are latched and applied on verse2 entry;
//! inside verse2 they swap the ring immediately.

use crate::chart::{DifficultyLevel, Section, SectionPatterns, SongChart};
use crate::clip::{ClipLibrary, ClipTransport};
use crate::engine::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// No section entered yet.
    Idle,
    /// Single clip restarting in place (intro, break).
    Fixed,
    /// Rotating through a pattern ring (verses).
    Ring,
    /// No playable clip for this section; transport frozen.
    Hold,
}

/// Drives clip selection and loop advancement for one session.
pub struct PatternScheduler {
    library: ClipLibrary,
    patterns: SectionPatterns,
    transport: ClipTransport,
    song_bpm: f64,
    loop_epsilon: f64,
    restart_offset: f64,
    mode: Mode,
    ring: Vec<String>,
    ring_index: usize,
    level: DifficultyLevel,
    pending_level: Option<DifficultyLevel>,
    section: Option<Section>,
}

impl PatternScheduler {
    pub fn new(
        chart: &SongChart,
        library: ClipLibrary,
        level: DifficultyLevel,
        config: &EngineConfig,
    ) -> Self {
        Self {
            library,
            patterns: chart.section_patterns.clone(),
            transport: ClipTransport::new(),
            song_bpm: chart.bpm,
            loop_epsilon: config.loop_epsilon,
            restart_offset: config.restart_offset,
            mode: Mode::Idle,
            ring: Vec::new(),
            ring_index: 0,
            level,
            pending_level: None,
            section: None,
        }
    }

    /// React to a section enter. Applies any latched difficulty on verse2
    /// entry, then resolves the section's clip source and starts it at the
    /// restart offset, the same seek every later load uses.
    pub fn enter_section(&mut self, section: Section) {
        if section == Section::Verse2 {
            if let Some(next) = self.pending_level.take() {
                log::info!("applying deferred difficulty {} on verse2 entry", next);
                self.level = next;
            }
        }
        self.section = Some(section);

        match self.patterns.ring_for(section, self.level) {
            None => {
                // Fixed sections are keyed by their own name in the library
                self.load_fixed(section.as_str());
            }
            Some(ring) if ring.is_empty() => {
                log::warn!("no patterns for {section} at {}, holding", self.level);
                self.hold();
            }
            Some(ring) => {
                self.ring = ring.to_vec();
                self.ring_index = 0;
                self.mode = Mode::Ring;
                self.load_ring_slot();
                self.transport.play();
            }
        }
    }

    /// Difficulty decision from the backend. Latched until verse2 entry
    /// unless verse2 is already playing, in which case the ring is swapped
    /// on the spot while the transport keeps its play state.
    pub fn level_decision(&mut self, next: DifficultyLevel) {
        if self.section == Some(Section::Verse2) {
            log::info!("difficulty {next} applied mid-verse");
            self.level = next;
            self.pending_level = None;
            match self.patterns.ring_for(Section::Verse2, next) {
                Some(ring) if !ring.is_empty() => {
                    self.ring = ring.to_vec();
                    self.ring_index = 0;
                    self.mode = Mode::Ring;
                    self.load_ring_slot();
                }
                _ => {
                    log::warn!("no patterns for verse2 at {next}, holding");
                    self.hold();
                }
            }
        } else {
            // Only the newest undelivered decision survives
            log::debug!("difficulty {next} deferred until verse2");
            self.pending_level = Some(next);
        }
    }

    /// Advance the clip transport by wall-clock time and rotate or restart
    /// at the loop boundary.
    pub fn tick(&mut self, wall_dt: f64) {
        self.transport.advance(wall_dt);
        if matches!(self.mode, Mode::Fixed | Mode::Ring)
            && self.transport.past_loop_boundary(self.loop_epsilon)
        {
            self.advance_loop();
        }
    }

    /// A clip-end report from the media layer. Ticks normally reach the
    /// boundary first and reset the position, which makes a trailing end
    /// report a no-op.
    pub fn clip_ended(&mut self) {
        if matches!(self.mode, Mode::Fixed | Mode::Ring)
            && self.transport.past_loop_boundary(self.loop_epsilon)
        {
            self.advance_loop();
        }
    }

    /// Freeze clip motion, keeping the pose on screen.
    pub fn pause(&mut self) {
        self.transport.pause();
    }

    /// Resume clip motion unless the scheduler is in a degraded hold.
    pub fn resume(&mut self) {
        if self.mode != Mode::Hold {
            self.transport.play();
        }
    }

    /// Key of the clip currently on the transport.
    pub fn current_key(&self) -> Option<&str> {
        self.transport.current_key()
    }

    /// Position within the current clip loop, in seconds.
    pub fn clip_position(&self) -> Option<f64> {
        self.transport.position()
    }

    /// Difficulty currently in effect.
    pub fn level(&self) -> DifficultyLevel {
        self.level
    }

    /// Difficulty latched for the next verse2 entry, if any.
    pub fn pending_level(&self) -> Option<DifficultyLevel> {
        self.pending_level
    }

    /// True while no playable clip exists for the current section.
    pub fn is_holding(&self) -> bool {
        self.mode == Mode::Hold
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    fn advance_loop(&mut self) {
        match self.mode {
            Mode::Ring => {
                self.ring_index = (self.ring_index + 1) % self.ring.len();
                self.load_ring_slot();
            }
            Mode::Fixed => self.transport.restart(self.restart_offset),
            Mode::Idle | Mode::Hold => {}
        }
    }

    /// Load the clip at the current ring slot, seeking the restart offset.
    /// An unknown key restarts the clip already on the transport so motion
    /// never freezes mid-verse; the rotation still moves on, so the bad
    /// slot is skipped next lap.
    fn load_ring_slot(&mut self) {
        let key = self.ring[self.ring_index].clone();
        match self.library.get(&key) {
            Some(clip) => {
                let rate = self.song_bpm / clip.reference_bpm;
                self.transport.load(clip, rate, self.restart_offset);
            }
            None => {
                log::warn!("pattern clip {key} missing from library, keeping previous clip");
                self.transport.restart(self.restart_offset);
            }
        }
    }

    fn load_fixed(&mut self, key: &str) {
        match self.library.get(key) {
            Some(clip) => {
                let rate = self.song_bpm / clip.reference_bpm;
                self.mode = Mode::Fixed;
                self.transport.load(clip, rate, self.restart_offset);
                self.transport.play();
            }
            None => {
                log::warn!("fixed clip {key} missing from library, holding");
                self.hold();
            }
        }
    }

    fn hold(&mut self) {
        self.mode = Mode::Hold;
        self.transport.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::LevelTable;
    use crate::clip::PatternClip;
    use assert_approx_eq::assert_approx_eq;

    /// Library where every pattern runs 16 beats at 100 bpm, so a clip
    /// loop is exactly 9.6s at rate 1.0.
    fn even_library() -> ClipLibrary {
        let mut library = ClipLibrary::new();
        for key in ["intro", "break"] {
            library.insert(PatternClip {
                key: key.to_string(),
                source_ref: format!("clips/{key}.mp4"),
                reference_bpm: 100.0,
                loop_beats: 8,
            });
        }
        for key in ["p1", "p2", "p3", "p4"] {
            library.insert(PatternClip {
                key: key.to_string(),
                source_ref: format!("clips/{key}.mp4"),
                reference_bpm: 100.0,
                loop_beats: 16,
            });
        }
        library
    }

    fn test_chart() -> SongChart {
        let mut chart = SongChart::demo();
        chart.bpm = 100.0;
        chart.duration = 80.0;
        chart.section_patterns = SectionPatterns {
            verse1: vec!["p1".into(), "p2".into()],
            verse2: LevelTable {
                level1: vec!["p1".into(), "p2".into()],
                level2: vec!["p1".into(), "p2".into(), "p3".into()],
                level3: vec!["p1".into(), "p2".into(), "p3".into(), "p4".into()],
            },
        };
        chart
    }

    fn scheduler_at(level: DifficultyLevel) -> PatternScheduler {
        PatternScheduler::new(
            &test_chart(),
            even_library(),
            level,
            &EngineConfig::default(),
        )
    }

    /// Drive `tick` in 50ms steps from `from` to `to` song seconds and
    /// record every clip-key change as (time, key).
    fn drive(scheduler: &mut PatternScheduler, from: f64, to: f64) -> Vec<(f64, String)> {
        let mut changes = Vec::new();
        let mut last = scheduler.current_key().map(str::to_string);
        let mut t = from;
        while t < to {
            scheduler.tick(0.05);
            t += 0.05;
            let key = scheduler.current_key().map(str::to_string);
            if key != last {
                if let Some(ref k) = key {
                    changes.push((t, k.clone()));
                }
                last = key;
            }
        }
        changes
    }

    #[test]
    fn verse_ring_advances_at_loop_boundaries() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level2);
        scheduler.enter_section(Section::Verse2);
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert!(scheduler.is_playing());

        let changes = drive(&mut scheduler, 50.0, 80.0);
        assert_eq!(changes.len(), 3);

        let (t1, ref k1) = changes[0];
        let (t2, ref k2) = changes[1];
        let (t3, ref k3) = changes[2];
        assert_eq!(k1, "p2");
        assert_eq!(k2, "p3");
        assert_eq!(k3, "p1"); // ring wraps
        assert!((59.5..=59.7).contains(&t1), "first advance at {t1}");
        assert!((69.0..=69.3).contains(&t2), "second advance at {t2}");
        assert!((78.5..=78.9).contains(&t3), "third advance at {t3}");
    }

    #[test]
    fn every_load_starts_at_the_restart_offset() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);

        // Fixed and ring entries both seek past zero, like every
        // later loop restart
        scheduler.enter_section(Section::Intro);
        assert_approx_eq!(scheduler.clip_position().unwrap(), 0.06, 1e-12);

        scheduler.enter_section(Section::Verse1);
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert_approx_eq!(scheduler.clip_position().unwrap(), 0.06, 1e-12);
    }

    #[test]
    fn advance_restarts_near_clip_start() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Verse1);

        drive(&mut scheduler, 0.0, 9.8);
        assert_eq!(scheduler.current_key(), Some("p2"));
        // Next clip picks up just past zero, not at zero
        assert!(scheduler.clip_position().unwrap() < 0.5);
        assert!(scheduler.clip_position().unwrap() >= 0.06);
    }

    #[test]
    fn single_clip_ring_loops_itself() {
        let mut chart = test_chart();
        chart.section_patterns.verse1 = vec!["p1".into()];
        let mut scheduler = PatternScheduler::new(
            &chart,
            even_library(),
            DifficultyLevel::Level1,
            &EngineConfig::default(),
        );
        scheduler.enter_section(Section::Verse1);

        for _ in 0..250 {
            scheduler.tick(0.05); // 12.5s, one boundary crossed
        }
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert!(scheduler.clip_position().unwrap() < 9.0);
    }

    #[test]
    fn empty_ring_enters_degraded_hold() {
        let mut chart = test_chart();
        chart.section_patterns.verse1 = Vec::new();
        let mut scheduler = PatternScheduler::new(
            &chart,
            even_library(),
            DifficultyLevel::Level1,
            &EngineConfig::default(),
        );

        scheduler.enter_section(Section::Intro);
        assert!(scheduler.is_playing());

        scheduler.enter_section(Section::Verse1);
        assert!(scheduler.is_holding());
        assert!(!scheduler.is_playing());
        // Last loaded clip stays for the frozen pose
        assert_eq!(scheduler.current_key(), Some("intro"));

        // Ticks in hold neither move nor rotate
        for _ in 0..300 {
            scheduler.tick(0.05);
        }
        assert_eq!(scheduler.current_key(), Some("intro"));
    }

    #[test]
    fn hold_recovers_on_next_section() {
        let mut chart = test_chart();
        chart.section_patterns.verse1 = Vec::new();
        let mut scheduler = PatternScheduler::new(
            &chart,
            even_library(),
            DifficultyLevel::Level1,
            &EngineConfig::default(),
        );

        scheduler.enter_section(Section::Verse1);
        assert!(scheduler.is_holding());

        scheduler.enter_section(Section::Break);
        assert!(!scheduler.is_holding());
        assert!(scheduler.is_playing());
        assert_eq!(scheduler.current_key(), Some("break"));
    }

    #[test]
    fn intro_uses_fixed_clip_at_song_rate() {
        let chart = SongChart::demo(); // bpm 129.715
        let mut scheduler = PatternScheduler::new(
            &chart,
            ClipLibrary::builtin(),
            DifficultyLevel::Level1,
            &EngineConfig::default(),
        );
        scheduler.enter_section(Section::Intro);

        assert_eq!(scheduler.current_key(), Some("intro"));
        scheduler.tick(1.0);
        // Clip time runs faster than wall time: 129.715 / 100, on top of
        // the entry seek
        assert_approx_eq!(scheduler.clip_position().unwrap(), 0.06 + 1.29715, 1e-9);
    }

    #[test]
    fn fixed_clip_restarts_at_boundary() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Break);
        assert_eq!(scheduler.current_key(), Some("break"));

        // 8 beats at 100 bpm is a 4.8s loop
        let changes = drive(&mut scheduler, 0.0, 6.0);
        assert!(changes.is_empty(), "fixed clip never changes key");
        assert_eq!(scheduler.current_key(), Some("break"));
        assert!(scheduler.clip_position().unwrap() < 2.0);
    }

    #[test]
    fn level_decision_defers_until_verse2() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Break);

        scheduler.level_decision(DifficultyLevel::Level2);
        assert_eq!(scheduler.level(), DifficultyLevel::Level1);
        assert_eq!(scheduler.pending_level(), Some(DifficultyLevel::Level2));

        scheduler.enter_section(Section::Verse2);
        assert_eq!(scheduler.level(), DifficultyLevel::Level2);
        assert!(scheduler.pending_level().is_none());
        assert_eq!(scheduler.current_key(), Some("p1"));
    }

    #[test]
    fn latest_deferred_decision_wins() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Break);

        scheduler.level_decision(DifficultyLevel::Level2);
        scheduler.level_decision(DifficultyLevel::Level3);

        scheduler.enter_section(Section::Verse2);
        assert_eq!(scheduler.level(), DifficultyLevel::Level3);
    }

    #[test]
    fn decision_in_verse2_switches_immediately() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Verse2);
        drive(&mut scheduler, 0.0, 2.0);

        scheduler.level_decision(DifficultyLevel::Level3);
        assert_eq!(scheduler.level(), DifficultyLevel::Level3);
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert_approx_eq!(scheduler.clip_position().unwrap(), 0.06, 1e-12);
        assert!(scheduler.is_playing(), "switch keeps the transport running");
    }

    #[test]
    fn immediate_switch_preserves_pause() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Verse2);
        scheduler.pause();

        scheduler.level_decision(DifficultyLevel::Level2);
        assert!(!scheduler.is_playing(), "switch must not unpause");
    }

    #[test]
    fn missing_ring_key_keeps_previous_clip_looping() {
        let mut chart = test_chart();
        chart.section_patterns.verse1 = vec!["p1".into(), "ghost".into()];
        let mut scheduler = PatternScheduler::new(
            &chart,
            even_library(),
            DifficultyLevel::Level1,
            &EngineConfig::default(),
        );
        scheduler.enter_section(Section::Verse1);

        // First boundary lands on the missing key: p1 restarts in place
        drive(&mut scheduler, 0.0, 10.0);
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert!(scheduler.is_playing());
        assert!(scheduler.clip_position().unwrap() < 1.0);

        // Second boundary rotates back onto the valid key
        drive(&mut scheduler, 10.0, 20.0);
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert!(scheduler.is_playing());
    }

    #[test]
    fn clip_end_report_after_tick_advance_is_ignored() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Verse1);

        drive(&mut scheduler, 0.0, 10.0);
        assert_eq!(scheduler.current_key(), Some("p2"));
        let pos = scheduler.clip_position().unwrap();

        scheduler.clip_ended();
        assert_eq!(scheduler.current_key(), Some("p2"));
        assert_approx_eq!(scheduler.clip_position().unwrap(), pos, 1e-12);
    }

    #[test]
    fn no_motion_before_first_section() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.tick(5.0);
        assert!(scheduler.current_key().is_none());
        assert!(scheduler.clip_position().is_none());
    }

    #[test]
    fn paused_transport_never_rotates() {
        let mut scheduler = scheduler_at(DifficultyLevel::Level1);
        scheduler.enter_section(Section::Verse1);
        scheduler.pause();

        for _ in 0..400 {
            scheduler.tick(0.05); // 20s of wall time, two loops worth
        }
        assert_eq!(scheduler.current_key(), Some("p1"));
        assert_approx_eq!(scheduler.clip_position().unwrap(), 0.06, 1e-12);

        scheduler.resume();
        assert!(scheduler.is_playing());
    }

    #[test]
    fn resume_does_not_wake_a_hold() {
        let mut chart = test_chart();
        chart.section_patterns.verse1 = Vec::new();
        let mut scheduler = PatternScheduler::new(
            &chart,
            even_library(),
            DifficultyLevel::Level1,
            &EngineConfig::default(),
        );
        scheduler.enter_section(Section::Verse1);

        scheduler.pause();
        scheduler.resume();
        assert!(!scheduler.is_playing());
    }
}
