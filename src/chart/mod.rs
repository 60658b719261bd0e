//! Song chart — section anchors, capture windows, cue lists, and pattern rings.
//!
//! A chart describes one playable song: where its sections begin, which
//! camera-capture windows it opens, the per-section action cues shown to the
//! player, and which movement-pattern clips each section cycles through.
//! Charts arrive from the session backend as YAML (camelCase field names)
//! or from a local file; a builtin demo chart covers offline runs and tests.

use serde::{Deserialize, Serialize};

/// A song section. Derived from the timeline anchors, never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Intro,
    Verse1,
    Break,
    Verse2,
}

impl Section {
    /// Short lowercase name, matching the wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Intro => "intro",
            Section::Verse1 => "verse1",
            Section::Break => "break",
            Section::Verse2 => "verse2",
        }
    }

    /// Whether this section runs patterned choreography.
    pub fn is_verse(&self) -> bool {
        matches!(self, Section::Verse1 | Section::Verse2)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movement difficulty for verse2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Level1,
    Level2,
    Level3,
}

impl DifficultyLevel {
    /// Map a wire-level number (1..=3) to a difficulty.
    pub fn from_number(n: i32) -> Option<Self> {
        match n {
            1 => Some(DifficultyLevel::Level1),
            2 => Some(DifficultyLevel::Level2),
            3 => Some(DifficultyLevel::Level3),
            _ => None,
        }
    }

    /// Wire-level number (1..=3).
    pub fn number(&self) -> i32 {
        match self {
            DifficultyLevel::Level1 => 1,
            DifficultyLevel::Level2 => 2,
            DifficultyLevel::Level3 => 3,
        }
    }
}

impl Default for DifficultyLevel {
    fn default() -> Self {
        DifficultyLevel::Level1
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "level{}", self.number())
    }
}

/// One value per difficulty level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelTable<T> {
    pub level1: T,
    pub level2: T,
    pub level3: T,
}

impl<T> LevelTable<T> {
    /// Entry for the given difficulty.
    pub fn get(&self, level: DifficultyLevel) -> &T {
        match level {
            DifficultyLevel::Level1 => &self.level1,
            DifficultyLevel::Level2 => &self.level2,
            DifficultyLevel::Level3 => &self.level3,
        }
    }
}

/// Absolute section start offsets in seconds.
///
/// Sorted ascending, the anchors partition `[0, duration)` into contiguous
/// sections; the last section ends at the track duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongTimeline {
    pub intro_start: f64,
    pub verse1_start: f64,
    pub break_start: f64,
    pub verse2_start: f64,
}

impl SongTimeline {
    /// Anchors sorted ascending by start time.
    pub fn sorted_anchors(&self) -> [(f64, Section); 4] {
        let mut anchors = [
            (self.intro_start, Section::Intro),
            (self.verse1_start, Section::Verse1),
            (self.break_start, Section::Break),
            (self.verse2_start, Section::Verse2),
        ];
        anchors.sort_by(|a, b| a.0.total_cmp(&b.0));
        anchors
    }
}

/// An absolute `[start, end)` interval of song time during which camera
/// frames are sampled and streamed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureWindow {
    pub start_time: f64,
    pub end_time: f64,
}

impl CaptureWindow {
    /// A window must be finite and strictly positive in length.
    pub fn is_valid(&self) -> bool {
        self.start_time.is_finite()
            && self.end_time.is_finite()
            && self.start_time >= 0.0
            && self.end_time > self.start_time
    }

    /// Window length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// The capture windows of a chart, one per verse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub verse1cam: CaptureWindow,
    pub verse2cam: CaptureWindow,
}

/// A timed movement cue shown to the player. Display-only; the scheduler
/// never consumes cues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCue {
    pub time: f64,
    pub action_code: u32,
    pub action_name: String,
}

/// Pattern-clip rings per section. Verse2 carries one ring per difficulty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionPatterns {
    #[serde(default)]
    pub verse1: Vec<String>,
    #[serde(default)]
    pub verse2: LevelTable<Vec<String>>,
}

impl SectionPatterns {
    /// Ring for a verse section, or None for intro/break (single fixed clip).
    pub fn ring_for(&self, section: Section, level: DifficultyLevel) -> Option<&[String]> {
        match section {
            Section::Verse1 => Some(&self.verse1),
            Section::Verse2 => Some(self.verse2.get(level)),
            Section::Intro | Section::Break => None,
        }
    }
}

/// A complete song chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongChart {
    pub bpm: f64,
    pub duration: f64,
    pub section_info: SongTimeline,
    pub segment_info: SegmentInfo,
    #[serde(default)]
    pub verse1_timeline: Vec<ActionCue>,
    #[serde(default)]
    pub verse2_timelines: LevelTable<Vec<ActionCue>>,
    #[serde(default)]
    pub section_patterns: SectionPatterns,
}

impl SongChart {
    /// Check the chart invariants. Hard failures return an error; dubious
    /// but survivable data (empty rings, invalid windows) only warns since
    /// the engine degrades gracefully around it.
    pub fn validate(&self) -> Result<(), ChartError> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(ChartError::Invalid(format!("bpm out of range: {}", self.bpm)));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ChartError::Invalid(format!(
                "duration out of range: {}",
                self.duration
            )));
        }
        for (start, section) in self.section_info.sorted_anchors() {
            if !start.is_finite() || start < 0.0 || start >= self.duration {
                return Err(ChartError::Invalid(format!(
                    "{section} anchor {start} outside [0, {})",
                    self.duration
                )));
            }
        }
        for (name, window) in [
            ("verse1cam", &self.segment_info.verse1cam),
            ("verse2cam", &self.segment_info.verse2cam),
        ] {
            if !window.is_valid() {
                log::warn!(
                    "chart window {name} invalid ({} .. {}), it will be dropped at arm time",
                    window.start_time,
                    window.end_time
                );
            }
        }
        Ok(())
    }

    /// Cue list for a section, or None for sections without cues.
    pub fn cues_for(&self, section: Section, level: DifficultyLevel) -> Option<&[ActionCue]> {
        match section {
            Section::Verse1 => Some(&self.verse1_timeline),
            Section::Verse2 => Some(self.verse2_timelines.get(level)),
            Section::Intro | Section::Break => None,
        }
    }

    /// Load and validate a chart from a YAML file.
    pub fn load(path: &std::path::Path) -> Result<Self, ChartError> {
        let content = std::fs::read_to_string(path)?;
        let chart: SongChart = serde_yaml::from_str(&content)?;
        chart.validate()?;
        Ok(chart)
    }

    /// Builtin demo chart: one full reference session, usable offline.
    pub fn demo() -> Self {
        SongChart {
            bpm: 129.715,
            duration: 220.357,
            section_info: SongTimeline {
                intro_start: 4.163,
                verse1_start: 33.693,
                break_start: 107.563,
                verse2_start: 138.953,
            },
            segment_info: SegmentInfo {
                verse1cam: CaptureWindow {
                    start_time: 48.473,
                    end_time: 92.783,
                },
                verse2cam: CaptureWindow {
                    start_time: 153.733,
                    end_time: 198.043,
                },
            },
            verse1_timeline: vec![
                cue(33.69, 1, "clap"),
                cue(35.54, 2, "arm swing"),
                cue(37.38, 1, "clap"),
                cue(41.07, 2, "arm swing"),
            ],
            verse2_timelines: LevelTable {
                level1: vec![cue(146.33, 1, "clap"), cue(153.73, 2, "arm swing")],
                level2: vec![cue(157.42, 1, "clap"), cue(167.57, 2, "arm swing")],
                level3: vec![cue(177.73, 1, "clap"), cue(187.89, 2, "arm swing")],
            },
            section_patterns: SectionPatterns {
                verse1: vec!["P1".to_string(), "P2".to_string()],
                verse2: LevelTable {
                    level1: vec!["P1".to_string(), "P2".to_string()],
                    level2: vec!["P1".to_string(), "P2".to_string(), "P3".to_string()],
                    level3: vec![
                        "P1".to_string(),
                        "P2".to_string(),
                        "P3".to_string(),
                        "P4".to_string(),
                    ],
                },
            },
        }
    }
}

fn cue(time: f64, code: u32, name: &str) -> ActionCue {
    ActionCue {
        time,
        action_code: code,
        action_name: name.to_string(),
    }
}

/// Chart loading and validation errors.
#[derive(Debug)]
pub enum ChartError {
    /// Could not read the chart file.
    Io(std::io::Error),
    /// The file is not a valid chart document.
    Parse(serde_yaml::Error),
    /// The chart violates a structural invariant.
    Invalid(String),
}

impl std::fmt::Display for ChartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartError::Io(e) => write!(f, "chart io error: {e}"),
            ChartError::Parse(e) => write!(f, "chart parse error: {e}"),
            ChartError::Invalid(e) => write!(f, "invalid chart: {e}"),
        }
    }
}

impl std::error::Error for ChartError {}

impl From<std::io::Error> for ChartError {
    fn from(e: std::io::Error) -> Self {
        ChartError::Io(e)
    }
}

impl From<serde_yaml::Error> for ChartError {
    fn from(e: serde_yaml::Error) -> Self {
        ChartError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn demo_chart_is_valid() {
        let chart = SongChart::demo();
        assert!(chart.validate().is_ok());
    }

    #[test]
    fn anchors_sort_ascending() {
        let timeline = SongTimeline {
            intro_start: 4.163,
            verse1_start: 33.693,
            break_start: 107.563,
            verse2_start: 138.953,
        };
        let anchors = timeline.sorted_anchors();
        assert_eq!(anchors[0].1, Section::Intro);
        assert_eq!(anchors[1].1, Section::Verse1);
        assert_eq!(anchors[2].1, Section::Break);
        assert_eq!(anchors[3].1, Section::Verse2);
        for pair in anchors.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }

    #[test]
    fn anchors_sort_handles_unordered_input() {
        // Anchors are not required to arrive in section order
        let timeline = SongTimeline {
            intro_start: 50.0,
            verse1_start: 0.0,
            break_start: 30.0,
            verse2_start: 10.0,
        };
        let anchors = timeline.sorted_anchors();
        assert_eq!(anchors[0], (0.0, Section::Verse1));
        assert_eq!(anchors[3], (50.0, Section::Intro));
    }

    #[test]
    fn invalid_bpm_rejected() {
        let mut chart = SongChart::demo();
        chart.bpm = 0.0;
        assert!(chart.validate().is_err());
        chart.bpm = f64::NAN;
        assert!(chart.validate().is_err());
    }

    #[test]
    fn anchor_past_duration_rejected() {
        let mut chart = SongChart::demo();
        chart.section_info.verse2_start = chart.duration + 1.0;
        assert!(chart.validate().is_err());
    }

    #[test]
    fn invalid_window_only_warns() {
        let mut chart = SongChart::demo();
        chart.segment_info.verse1cam.end_time = chart.segment_info.verse1cam.start_time;
        // Windows degrade at arm time, validation still passes
        assert!(chart.validate().is_ok());
        assert!(!chart.segment_info.verse1cam.is_valid());
    }

    #[test]
    fn window_validity() {
        let good = CaptureWindow {
            start_time: 48.473,
            end_time: 92.783,
        };
        assert!(good.is_valid());
        assert!((good.duration() - 44.31).abs() < 1e-9);

        let inverted = CaptureWindow {
            start_time: 10.0,
            end_time: 5.0,
        };
        assert!(!inverted.is_valid());

        let nan = CaptureWindow {
            start_time: f64::NAN,
            end_time: 5.0,
        };
        assert!(!nan.is_valid());
    }

    #[test]
    fn ring_resolution_per_section() {
        let chart = SongChart::demo();
        assert_eq!(
            chart
                .section_patterns
                .ring_for(Section::Verse1, DifficultyLevel::Level1),
            Some(&["P1".to_string(), "P2".to_string()][..])
        );
        let verse2_l2 = chart
            .section_patterns
            .ring_for(Section::Verse2, DifficultyLevel::Level2)
            .unwrap();
        assert_eq!(verse2_l2.len(), 3);
        assert!(chart
            .section_patterns
            .ring_for(Section::Intro, DifficultyLevel::Level1)
            .is_none());
    }

    #[test]
    fn cues_resolution_per_section() {
        let chart = SongChart::demo();
        assert_eq!(
            chart
                .cues_for(Section::Verse1, DifficultyLevel::Level1)
                .unwrap()
                .len(),
            4
        );
        assert_eq!(
            chart
                .cues_for(Section::Verse2, DifficultyLevel::Level3)
                .unwrap()[0]
                .time,
            177.73
        );
        assert!(chart.cues_for(Section::Break, DifficultyLevel::Level1).is_none());
    }

    #[test]
    fn level_from_number() {
        assert_eq!(DifficultyLevel::from_number(1), Some(DifficultyLevel::Level1));
        assert_eq!(DifficultyLevel::from_number(3), Some(DifficultyLevel::Level3));
        assert_eq!(DifficultyLevel::from_number(0), None);
        assert_eq!(DifficultyLevel::from_number(4), None);
    }

    #[test]
    fn yaml_round_trip() {
        let chart = SongChart::demo();
        let yaml = serde_yaml::to_string(&chart).unwrap();
        // Wire form uses camelCase keys
        assert!(yaml.contains("sectionInfo"));
        assert!(yaml.contains("introStart"));
        assert!(yaml.contains("startTime"));
        let back: SongChart = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, chart);
    }

    #[test]
    fn load_from_file() {
        let chart = SongChart::demo();
        let yaml = serde_yaml::to_string(&chart).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let loaded = SongChart::load(file.path()).unwrap();
        assert_eq!(loaded, chart);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = SongChart::load(std::path::Path::new("/nonexistent/chart.yaml")).unwrap_err();
        // The io source survives the wrap, kind and all
        match err {
            ChartError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected an io error, got {other}"),
        }
    }

    #[test]
    fn load_garbage_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{{{{ not yaml").unwrap();
        let err = SongChart::load(file.path()).unwrap_err();
        assert!(matches!(err, ChartError::Parse(_)));
    }

    #[test]
    fn minimal_chart_parses_with_defaults() {
        let yaml = r#"
bpm: 120.0
duration: 60.0
sectionInfo:
  introStart: 0.0
  verse1Start: 10.0
  breakStart: 40.0
  verse2Start: 50.0
segmentInfo:
  verse1cam: { startTime: 12.0, endTime: 35.0 }
  verse2cam: { startTime: 52.0, endTime: 58.0 }
"#;
        let chart: SongChart = serde_yaml::from_str(yaml).unwrap();
        assert!(chart.verse1_timeline.is_empty());
        assert!(chart.section_patterns.verse1.is_empty());
        assert!(chart.validate().is_ok());
    }
}
