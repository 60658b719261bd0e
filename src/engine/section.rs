//! Section clock — maps master-clock time to the current song section.
//!
//! Detection is a pure lookup over the sorted timeline anchors; the
//! stateful [`update`](SectionClock::update) layer turns it into
//! edge-triggered enter events, at most one per physical transition no
//! matter how often it is polled.

use crate::chart::{Section, SongTimeline};

/// Derives the current section from playback time and reports transitions.
#[derive(Debug, Clone)]
pub struct SectionClock {
    anchors: [(f64, Section); 4],
    current: Option<Section>,
}

impl SectionClock {
    /// Build from a chart timeline. Anchors are sorted once here.
    pub fn new(timeline: &SongTimeline) -> Self {
        Self {
            anchors: timeline.sorted_anchors(),
            current: None,
        }
    }

    /// Section at time `t`: the one with the greatest anchor <= t, or the
    /// first section when `t` lies before every anchor. Total and
    /// monotonic in `t`.
    pub fn detect(&self, t: f64) -> Section {
        let mut detected = self.anchors[0].1;
        for (start, section) in self.anchors {
            if t >= start {
                detected = section;
            } else {
                break;
            }
        }
        detected
    }

    /// Run detection and report a section enter if the detected section
    /// differs from the previous one. The first call always reports.
    pub fn update(&mut self, t: f64) -> Option<Section> {
        let detected = self.detect(t);
        if self.current != Some(detected) {
            self.current = Some(detected);
            Some(detected)
        } else {
            None
        }
    }

    /// The most recently detected section.
    pub fn current(&self) -> Option<Section> {
        self.current
    }

    /// Forget the detection state so the next update reports again.
    /// Used when playback is re-armed.
    pub fn reset(&mut self) {
        self.current = None;
    }
}
