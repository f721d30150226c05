//! # Actuators Module
//!
//! Everything on the output side of the monitor: the per-feed color tables
//! and the smart bulb gateway that shows the current flag.
//!
//! The orchestrator owns exactly one [`ActuatorGateway`] and is the only
//! caller, so implementations need no internal locking.

pub mod color_table;
pub mod kasa;

use async_trait::async_trait;
use thiserror::Error;

use crate::ingestors::types::{FeedKind, FlagCode};
use crate::loggers::LogSink;

pub use color_table::{ColorOverrides, ColorSpec, ColorTable, ColorTables};
pub use kasa::{Credentials, KasaBulb};

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("no device address configured")]
    NoAddress,

    #[error("device is not connected")]
    NotConnected,

    #[error("device did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame of {0} bytes exceeds the protocol limit")]
    FrameTooLarge(usize),

    #[error("invalid JSON from device: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device rejected the request: {0}")]
    Device(String),
}

/// The light (or anything else) that displays the active flag.
#[async_trait]
pub trait ActuatorGateway: Send {
    /// Opens the connection and returns the device's display name.
    async fn connect(&mut self) -> Result<String, ActuatorError>;

    /// Shows the color for `code` in the active feed's table. Best effort:
    /// failures are reported on `log` and leave the gateway disconnected.
    async fn set_color(&mut self, code: &FlagCode, log: &LogSink);

    fn is_connected(&self) -> bool;

    /// Points the gateway at a new device. Drops any open connection.
    fn update_address(&mut self, address: String);

    fn set_active_feed_kind(&mut self, kind: FeedKind);
}
