use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

/// The inputs of the most recently submitted job, kept so it can be re-run
/// without re-uploading. Overwritten by every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub source_path: PathBuf,
    pub job_id: String,
    pub original_filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Append-only, chronological job log. Never pruned.
///
/// Every entry is mirrored to `tracing` at the matching level.
#[derive(Debug, Clone, Default)]
pub struct JobLog {
    entries: Vec<LogEntry>,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(target: "floorforge::job", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "floorforge::job", "{message}"),
            LogLevel::Error => tracing::error!(target: "floorforge::job", "{message}"),
        }
        self.entries.push(LogEntry {
            timestamp: Local::now(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Most recent entry at `ERROR` level.
    pub fn last_error(&self) -> Option<&LogEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.level == LogLevel::Error)
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[LogEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_kept_in_order() {
        let mut log = JobLog::new();
        log.info("one");
        log.warn("two");
        log.info("three");

        let messages: Vec<_> = log.recent(10).iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
        assert_eq!(log.last().unwrap().message, "three");
    }

    #[test]
    fn recent_returns_tail() {
        let mut log = JobLog::new();
        for i in 0..5 {
            log.info(format!("line {i}"));
        }
        let tail = log.recent(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].message, "line 2");
        assert_eq!(tail[2].message, "line 4");
        assert_eq!(log.recent(0).len(), 0);
    }

    #[test]
    fn last_error_skips_later_info() {
        let mut log = JobLog::new();
        log.error("detector offline");
        log.info("Config updated: scale = 0.1");
        assert_eq!(log.last_error().unwrap().message, "detector offline");
    }

    #[test]
    fn entry_renders_level_and_message() {
        let mut log = JobLog::new();
        log.warn("No objects detected.");
        let rendered = log.last().unwrap().to_string();
        assert!(rendered.starts_with('['));
        assert!(rendered.ends_with("] [WARN] No objects detected."));
    }
}
