//! # Feed Monitor Capability
//!
//! A monitor owns one feed's connection lifecycle and runs as an independent
//! task until its cancellation token fires. It reports through exactly two
//! channels: `Update`s sent to the orchestrator, and its `ConnectionState`.
//! No feed-level failure ever escapes `run`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::f1_signalr::{F1Config, F1SignalRMonitor};
use super::motogp_polling::MotoGpSchema;
use super::nascar_polling::NascarSchema;
use super::polling::{PollingConfig, PollingMonitor};
use super::types::{ConnectionState, FeedKind, Update};
use crate::loggers::LogSink;
use crate::retrieve::FetchError;

/// Errors that end one connection attempt. They are handled inside the run loop.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no active session upstream")]
    NoActiveSession,

    #[error("negotiation failed with HTTP {0}")]
    NegotiationStatus(u16),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid stream URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid request header: {0}")]
    Header(String),

    #[error("failed to encode control message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("stream closed by remote host")]
    Closed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything a monitor's run loop needs from its owner.
///
/// The cancellation token is checked at every suspension point through
/// `sleep`, `emit` and `cancelled`.
#[derive(Debug, Clone)]
pub struct MonitorContext {
    updates: mpsc::Sender<Update>,
    cancel: CancellationToken,
    log: LogSink,
}

impl MonitorContext {
    pub fn new(updates: mpsc::Sender<Update>, cancel: CancellationToken, log: LogSink) -> Self {
        Self { updates, cancel, log }
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the owner asked the monitor to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Sleeps for `duration`. Returns `false` if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Hands an update to the orchestrator, in order. Returns `false` if the
    /// monitor was cancelled or nobody is listening anymore.
    pub async fn emit(&self, update: Update) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.updates.send(update) => sent.is_ok(),
        }
    }
}

/// One feed's connection lifecycle.
#[async_trait]
pub trait FeedMonitor: Send {
    fn kind(&self) -> FeedKind;

    /// A reader handle on this monitor's connected flag.
    fn connection(&self) -> ConnectionState;

    /// Runs until `ctx` is cancelled, then releases the transport and returns
    /// with the connected flag cleared.
    async fn run(&mut self, ctx: MonitorContext);
}

/// Builds the monitor variant for a feed kind.
pub trait MonitorFactory: Send + Sync {
    fn create(&self, kind: FeedKind) -> Result<Box<dyn FeedMonitor>, FeedError>;
}

/// Endpoints and timings of the three real feeds.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub f1: F1Config,
    pub motogp: PollingConfig,
    pub nascar: PollingConfig,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            f1: F1Config::default(),
            motogp: MotoGpSchema::default_config(),
            nascar: NascarSchema::default_config(),
        }
    }
}

impl MonitorFactory for FeedSettings {
    fn create(&self, kind: FeedKind) -> Result<Box<dyn FeedMonitor>, FeedError> {
        let monitor: Box<dyn FeedMonitor> = match kind {
            FeedKind::F1 => Box::new(F1SignalRMonitor::new(self.f1.clone())?),
            FeedKind::MotoGp => Box::new(PollingMonitor::new(MotoGpSchema, self.motogp.clone())?),
            FeedKind::Nascar => Box::new(PollingMonitor::new(NascarSchema, self.nascar.clone())?),
        };
        Ok(monitor)
    }
}
