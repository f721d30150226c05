//! # Flag State Store
//!
//! Remembers the last flag code seen per feed and answers whether a new code
//! is a change. This is the authoritative dedup: monitors may suppress
//! repeats on their own, but every code still passes through here before it
//! reaches the actuator.

use std::collections::HashMap;

use crate::ingestors::types::{FeedKind, FlagCode};

#[derive(Debug, Default)]
pub struct FlagStateStore {
    last: HashMap<FeedKind, FlagCode>,
}

impl FlagStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records `code` iff it differs from the stored code
    /// for `kind`. An empty slot counts as different.
    pub fn should_emit(&mut self, kind: FeedKind, code: &FlagCode) -> bool {
        if self.last.get(&kind) == Some(code) {
            return false;
        }
        self.last.insert(kind, code.clone());
        true
    }

    pub fn last_seen(&self, kind: FeedKind) -> Option<&FlagCode> {
        self.last.get(&kind)
    }
}
