//! # Feed Ingestors Module
//!
//! Each submodule is a client for one race-status feed. It handles the logic
//! needed to connect to the feed, receive data, and manage the feed's
//! lifecycle. Every client sits behind the same `FeedMonitor` capability, so
//! the orchestrator can start and stop any of them the same way.
//!
//! ## Contained Modules:
//! - **`types`**: `FeedKind`, `FlagCode`, `Update` and `ConnectionState`, the
//!   vocabulary shared by monitors, the dedup store and the actuator.
//! - **`monitor`**: the `FeedMonitor` trait, the `MonitorContext` a run loop
//!   receives (update channel, cancellation token, log sink), and the
//!   `MonitorFactory` the orchestrator builds monitors from.
//! - **`frame_decoder`**: base64 + raw deflate + JSON decoding of the
//!   compressed `.z` fields in the F1 stream.
//! - **`f1_signalr`**: a SignalR websocket client for F1 live timing.
//! - **`polling`**: the shared self-scheduling poll loop.
//! - **`motogp_polling`** / **`nascar_polling`**: the schemas plugged into it.

pub mod types;
pub mod monitor;
pub mod frame_decoder;
pub mod f1_signalr;
pub mod polling;
pub mod motogp_polling;
pub mod nascar_polling;

// --- Public API Re-exports ---
pub use f1_signalr::{F1Config, F1SignalRMonitor};
pub use frame_decoder::{decode, DecodeError};
pub use monitor::{FeedError, FeedMonitor, FeedSettings, MonitorContext, MonitorFactory};
pub use motogp_polling::MotoGpSchema;
pub use nascar_polling::NascarSchema;
pub use polling::{PollSchema, PollingConfig, PollingMonitor};
pub use types::{ConnectionState, FeedKind, FlagCode, UnknownFeedKind, Update};
