//! # Core Engine Module
//!
//! Ties the feed monitors to the actuator.
//!
//! ## Core Components:
//!
//! - **`flag_state`**: the per-feed last-code store that decides whether a
//!   flag code is a change worth acting on.
//!
//! - **`orchestrator`**: the single task that owns the active monitor, the
//!   store and the actuator. It switches feeds on request, turns updates into
//!   color changes, and publishes a `StatusSnapshot` for the UI.

pub mod flag_state;
pub mod orchestrator;

// --- Public API Re-exports ---
pub use flag_state::FlagStateStore;
pub use orchestrator::{
    CurrentStatus, Orchestrator, OrchestratorHandle, OrchestratorRequest, StatusSnapshot,
};
