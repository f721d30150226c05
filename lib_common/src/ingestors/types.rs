//! Shared vocabulary of the feed layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Which upstream feed a monitor, update or color table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Formula 1 live timing, pushed over SignalR.
    F1,
    /// MotoGP livetiming-lite, polled.
    MotoGp,
    /// NASCAR live feed, polled.
    Nascar,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [FeedKind::F1, FeedKind::MotoGp, FeedKind::Nascar];

    /// The `(update key, nested field)` pair holding this feed's flag code.
    pub fn status_field(self) -> (&'static str, &'static str) {
        match self {
            FeedKind::F1 => ("TrackStatus", "Status"),
            FeedKind::MotoGp => ("MotoGPStatus", "Status"),
            FeedKind::Nascar => ("NascarFlag", "flag_state"),
        }
    }

    /// Stable lowercase identifier, as used in config and the HTTP API.
    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::F1 => "f1",
            FeedKind::MotoGp => "motogp",
            FeedKind::Nascar => "nascar",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FeedKind::F1 => "F1",
            FeedKind::MotoGp => "MotoGP",
            FeedKind::Nascar => "NASCAR",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feed kind: {0:?} (expected f1, motogp or nascar)")]
pub struct UnknownFeedKind(pub String);

impl FromStr for FeedKind {
    type Err = UnknownFeedKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f1" | "formula1" => Ok(FeedKind::F1),
            "motogp" => Ok(FeedKind::MotoGp),
            "nascar" => Ok(FeedKind::Nascar),
            _ => Err(UnknownFeedKind(s.to_string())),
        }
    }
}

/// A normalized race-status identifier, e.g. `"2"` for an F1 yellow.
///
/// Numeric feed values are kept as their decimal rendering so every feed's
/// alphabet can be looked up the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagCode(String);

impl FlagCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Strings are taken as-is, integers rendered; empty strings and other
    /// JSON types carry no code.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlagCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// One normalized message from a feed: field name to value.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub feed_kind: FeedKind,
    pub fields: Map<String, Value>,
}

impl Update {
    pub fn new(feed_kind: FeedKind, fields: Map<String, Value>) -> Self {
        Self { feed_kind, fields }
    }

    /// An update carrying a single field.
    pub fn single(feed_kind: FeedKind, key: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(key.into(), value);
        Self { feed_kind, fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The flag code this update carries for its feed, if any.
    pub fn flag_code(&self) -> Option<FlagCode> {
        let (key, field) = self.feed_kind.status_field();
        self.fields
            .get(key)
            .and_then(|status| status.get(field))
            .and_then(FlagCode::from_value)
    }
}

/// Connected flag of one monitor.
///
/// Only the owning monitor's run loop writes it; everyone else holds a clone
/// and reads a possibly slightly stale value.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState(Arc<AtomicBool>);

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }
}
