//! On-screen notices: section banners, warnings, and the judgment flash.
//!
//! Notices are text lines with absolute expiry deadlines. Judgments get a
//! dedicated single slot where a newer grade replaces the one still on
//! screen, each with its own short lifetime from the engine config.

use std::time::{Duration, Instant};

use crate::engine::config::EngineConfig;
use crate::net::Judgment;

/// Line shown while the feedback channel is away.
const LINK_DOWN_TEXT: &str = "connecting to the backend";

#[derive(Debug, Clone)]
struct Notice {
    text: String,
    expires_at: Instant,
}

/// Timed display state for one session.
#[derive(Debug)]
pub struct NoticeBoard {
    notices: Vec<Notice>,
    judgment: Option<(Judgment, Instant)>,
    judgment_ttl: Duration,
    link_down: bool,
}

impl NoticeBoard {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            notices: Vec::new(),
            judgment: None,
            judgment_ttl: config.judgment_ttl(),
            link_down: false,
        }
    }

    /// Post a notice that disappears after `ttl`.
    pub fn post(&mut self, text: impl Into<String>, ttl: Duration, now: Instant) {
        self.notices.push(Notice {
            text: text.into(),
            expires_at: now + ttl,
        });
    }

    /// Hold or drop the degraded-link line. The line has no deadline; it
    /// stays up until the caller reports the link healthy again.
    pub fn set_link_down(&mut self, down: bool) {
        self.link_down = down;
    }

    /// Flash a judgment grade. A grade already showing is replaced and the
    /// lifetime starts over.
    pub fn show_judgment(&mut self, grade: Judgment, now: Instant) {
        self.judgment = Some((grade, now + self.judgment_ttl));
    }

    /// Drop everything whose deadline has passed.
    pub fn sweep(&mut self, now: Instant) {
        self.notices.retain(|notice| notice.expires_at > now);
        if let Some((_, expires_at)) = self.judgment {
            if expires_at <= now {
                self.judgment = None;
            }
        }
    }

    /// Live notice lines, oldest first; the held link line comes last.
    pub fn lines(&self) -> Vec<&str> {
        let mut lines: Vec<&str> = self.notices.iter().map(|n| n.text.as_str()).collect();
        if self.link_down {
            lines.push(LINK_DOWN_TEXT);
        }
        lines
    }

    /// The judgment currently on screen.
    pub fn judgment(&self) -> Option<Judgment> {
        self.judgment.map(|(grade, _)| grade)
    }

    /// Clear the board. Used on teardown.
    pub fn clear(&mut self) {
        self.notices.clear();
        self.judgment = None;
        self.link_down = false;
    }
}
