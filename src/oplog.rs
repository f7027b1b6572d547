//! Bounded operation log.
//!
//! Keeps the most recent human-readable lines of batch activity for the
//! optional detailed log attached to summaries. Every line is also emitted
//! through `tracing`.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{info, warn};

/// Default number of retained lines.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

/// Ring buffer of log lines; the oldest line is dropped when full.
#[derive(Debug, Clone)]
pub struct OperationLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
    /// Lines ever pushed, including evicted ones.
    written: usize,
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl OperationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            written: 0,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "oa_bulkfix::oplog", "{message}");
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "oa_bulkfix::oplog", "{message}");
        self.push(LogLevel::Warn, message);
    }

    fn push(&mut self, level: LogLevel, message: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry { level, message });
        self.written += 1;
    }

    /// Mark the start of a batch so the lines after it can be sliced off.
    pub const fn mark(&self) -> usize {
        self.written
    }

    /// Lines recorded since `mark`, rendered one per line.
    pub fn render_since(&self, mark: usize) -> String {
        let since = self.written.saturating_sub(mark);
        self.entries
            .iter()
            .skip(self.entries.len().saturating_sub(since))
            .map(|e| match e.level {
                LogLevel::Info => e.message.clone(),
                LogLevel::Warn => format!("WARN: {}", e.message),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
