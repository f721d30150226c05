//! # lib_common
//!
//! Shared building blocks for the race flag monitor. The crate is split into
//! feature-gated modules so binaries only pull in what they use:
//!
//! - **`loggers`**: the UI-facing `LogSink` and the recent-lines `LogBuffer`.
//! - **`retrieve`**: the `reqwest` based `ApiClient` used by every HTTP feed.
//! - **`ingestors`**: the feed monitors (F1 SignalR stream, MotoGP and NASCAR
//!   polling) and the compressed frame decoder.
//! - **`actuators`**: color tables and the Kasa smart bulb gateway.
//! - **`core`**: the flag-state dedup store and the feed orchestrator.

#![forbid(unsafe_code)]

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "actuators")]
pub mod actuators;

#[cfg(feature = "core")]
pub mod core;
