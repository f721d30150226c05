//! # Log Sink
//!
//! The log-sink callback `(message) -> ()` the UI collaborator hands to the
//! core. Every call is mirrored to the `log` facade under the `flags` target so
//! the process log file keeps the full history even when the UI drops lines.

use log::Level;
use std::fmt;
use std::sync::Arc;

type Callback = dyn Fn(Level, &str) + Send + Sync;

/// A cheap-to-clone handle to a log callback.
#[derive(Clone)]
pub struct LogSink {
    callback: Arc<Callback>,
}

impl LogSink {
    /// Wraps a callback that only cares about the message text.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(move |_, message| callback(message)),
        }
    }

    /// Wraps a callback that also receives the level.
    pub fn with_levels<F>(callback: F) -> Self
    where
        F: Fn(Level, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A sink that only forwards to the `log` facade.
    pub fn discard() -> Self {
        Self::with_levels(|_, _| {})
    }

    /// Logs `message` at `level` to the facade and the callback.
    pub fn log(&self, level: Level, message: &str) {
        log::log!(target: "flags", level, "{}", message);
        (self.callback)(level, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}
