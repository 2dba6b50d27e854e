//! Visible transcript: capped, append-only list of rendered lines.

use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::capture::Level;
use crate::markup::markup_to_text;

pub const MAX_LINES: usize = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
    /// Echo of an operator command.
    Cmd,
    /// Value produced by evaluated script.
    Result,
}

impl LineLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LineLevel::Log => "log",
            LineLevel::Info => "info",
            LineLevel::Warn => "warn",
            LineLevel::Error => "error",
            LineLevel::Debug => "debug",
            LineLevel::Cmd => "cmd",
            LineLevel::Result => "result",
        }
    }

    /// Line level for a captured entry; `None` for the clear pseudo-level.
    pub fn from_captured(level: Level) -> Option<Self> {
        match level {
            Level::Log => Some(LineLevel::Log),
            Level::Info => Some(LineLevel::Info),
            Level::Warn => Some(LineLevel::Warn),
            Level::Error => Some(LineLevel::Error),
            Level::Debug => Some(LineLevel::Debug),
            Level::Clear => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLine {
    pub id: u64,
    pub timestamp: i64,
    pub level: LineLevel,
    pub body_html: String,
}

#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: VecDeque<ConsoleLine>,
    next_id: u64,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Appends a line, evicting the oldest once the cap is exceeded.
    pub fn append(&mut self, level: LineLevel, body_html: impl Into<String>, timestamp: i64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.lines.push_back(ConsoleLine {
            id,
            timestamp,
            level,
            body_html: body_html.into(),
        });
        while self.lines.len() > MAX_LINES {
            self.lines.pop_front();
        }
        id
    }

    /// Empties the transcript. Ids keep increasing across clears.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsoleLine> {
        self.lines.iter()
    }

    /// Lines appended after `after_id`, oldest first.
    pub fn since(&self, after_id: u64) -> impl Iterator<Item = &ConsoleLine> {
        let start = self.lines.partition_point(|line| line.id <= after_id);
        self.lines.range(start..)
    }

    pub fn first_id(&self) -> Option<u64> {
        self.lines.front().map(|line| line.id)
    }

    pub fn snapshot(&self) -> Vec<ConsoleLine> {
        self.lines.iter().cloned().collect()
    }

    /// Transcript as plain text, one `[time] level body` row per line.
    pub fn plain_text(&self, offset: FixedOffset) -> String {
        self.lines
            .iter()
            .map(|line| {
                format!(
                    "[{}] {} {}",
                    time_label(line.timestamp, offset),
                    line.level.as_str(),
                    markup_to_text(&line.body_html)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `HH:MM:SS` in the given offset; `--:--:--` when the timestamp is out of range.
pub fn time_label(timestamp_ms: i64, offset: FixedOffset) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || "--:--:--".to_string(),
        |utc| utc.with_timezone(&offset).format("%H:%M:%S").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc offset")
    }

    #[test]
    fn evicts_exactly_the_oldest_past_cap() {
        let mut buffer = LineBuffer::new();
        for index in 0..MAX_LINES {
            buffer.append(LineLevel::Log, format!("line {index}"), 0);
        }
        assert_eq!(buffer.len(), MAX_LINES);
        let first_id = buffer.iter().next().map(|line| line.id);

        buffer.append(LineLevel::Log, "overflow", 0);
        assert_eq!(buffer.len(), MAX_LINES);
        let lines = buffer.snapshot();
        assert_eq!(lines[0].body_html, "line 1");
        assert_eq!(lines[0].id, first_id.map_or(0, |id| id + 1));
        assert_eq!(lines[MAX_LINES - 1].body_html, "overflow");
    }

    #[test]
    fn ids_keep_increasing_after_clear() {
        let mut buffer = LineBuffer::new();
        let first = buffer.append(LineLevel::Info, "a", 0);
        buffer.clear();
        assert!(buffer.is_empty());
        let second = buffer.append(LineLevel::Info, "b", 0);
        assert!(second > first);
    }

    #[test]
    fn since_yields_only_newer_lines() {
        let mut buffer = LineBuffer::new();
        let first = buffer.append(LineLevel::Log, "a", 0);
        let second = buffer.append(LineLevel::Log, "b", 0);
        buffer.append(LineLevel::Log, "c", 0);

        let bodies = |after| {
            buffer
                .since(after)
                .map(|line| line.body_html.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(bodies(0), ["a", "b", "c"]);
        assert_eq!(bodies(first), ["b", "c"]);
        assert_eq!(bodies(second + 1), Vec::<String>::new());
        assert_eq!(buffer.first_id(), Some(first));
    }

    #[test]
    fn time_label_uses_offset_and_guards_range() {
        assert_eq!(time_label(3_723_000, utc()), "01:02:03");
        let plus_two = FixedOffset::east_opt(2 * 3600).expect("offset");
        assert_eq!(time_label(3_723_000, plus_two), "03:02:03");
        assert_eq!(time_label(i64::MAX, utc()), "--:--:--");
    }

    #[test]
    fn plain_text_strips_markup() {
        let mut buffer = LineBuffer::new();
        buffer.append(LineLevel::Cmd, r#"<span class="tok-dim">&gt;</span> echo a&amp;b"#, 0);
        buffer.append(LineLevel::Result, r#"<span class="tok-number">2</span>"#, 1_000);
        assert_eq!(
            buffer.plain_text(utc()),
            "[00:00:00] cmd > echo a&b\n[00:00:01] result 2"
        );
    }

    #[test]
    fn lines_serialize_for_export() {
        let mut buffer = LineBuffer::new();
        buffer.append(LineLevel::Warn, "careful", 5);
        let json = serde_json::to_value(buffer.snapshot()).expect("serialize lines");
        assert_eq!(
            json,
            serde_json::json!([{ "id": 1, "timestamp": 5, "level": "warn", "bodyHtml": "careful" }])
        );
    }

    #[test]
    fn clear_level_has_no_line_level() {
        assert_eq!(LineLevel::from_captured(Level::Clear), None);
        assert_eq!(LineLevel::from_captured(Level::Debug), Some(LineLevel::Debug));
    }
}
