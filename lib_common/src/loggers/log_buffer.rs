//! # Log Buffer
//!
//! Keeps the most recent log lines, each prefixed with a local `[HH:MM:SS]`
//! stamp, for display in a UI. Older lines fall off the front once the buffer
//! is full.

use super::log_sink::LogSink;
use chrono::Local;
use log::Level;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default number of lines a UI shows.
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Clone, Debug)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Appends a stamped line, evicting the oldest when full.
    pub fn push(&self, message: &str) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        if let Ok(mut lines) = self.lines.lock() {
            while lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.lines.lock().ok().and_then(|lines| lines.back().cloned())
    }

    /// A `LogSink` that feeds this buffer. Debug chatter stays in the log file.
    pub fn sink(&self) -> LogSink {
        let buffer = self.clone();
        LogSink::with_levels(move |level, message| {
            if level <= Level::Info {
                buffer.push(message);
            }
        })
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
