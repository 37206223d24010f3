use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Number of lines retained for replay to late subscribers.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Where a captured line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    /// Watcher standard output
    Stdout,
    /// Watcher standard error
    Stderr,
    /// Supervisor-internal notice (start, stop, restart)
    Sidecar,
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Stdout => write!(f, "stdout"),
            LogSource::Stderr => write!(f, "stderr"),
            LogSource::Sidecar => write!(f, "sidecar"),
        }
    }
}

/// A single captured line, immutable once created
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Timestamp assigned at capture time, not at delivery
    pub timestamp: DateTime<Local>,
    /// Which stream produced the line
    pub source: LogSource,
    /// Line content, trailing newline stripped
    pub text: String,
}

impl LogEntry {
    pub fn new(source: LogSource, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            source,
            text: text.into(),
        }
    }

    /// Render for delivery to subscribers: `[timestamp] [source] text`
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.source,
            self.text
        )
    }
}

/// Bounded, insertion-ordered buffer of captured lines
#[derive(Debug)]
pub struct LogHistory {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting the oldest one when at capacity
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
