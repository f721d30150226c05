//! # Loggers Module
//!
//! Library code logs through the `log` facade. On top of that, a UI (desktop
//! window, web page, terminal) usually wants a short human-readable trail of
//! what the monitors are doing. This module provides both halves of that
//! contract:
//!
//! - **`log_sink`**: `LogSink`, the cloneable callback every monitor and the
//!   orchestrator write to. Each message goes to the `log` facade and to the
//!   callback.
//! - **`log_buffer`**: `LogBuffer`, a bounded, timestamped ring of recent lines
//!   that a UI can poll.

/// The cloneable log callback handed to monitors and the orchestrator.
pub mod log_sink;
/// A bounded ring of recent, timestamped log lines for display.
pub mod log_buffer;

pub use log_buffer::LogBuffer;
pub use log_sink::LogSink;
