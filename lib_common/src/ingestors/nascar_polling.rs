//! # NASCAR Live Feed
//!
//! Polls `live-feed.json`. The status is the top-level integer `flag_state`.
//! Lap, time and race metadata ride along in the update. NASCAR repeats the
//! same flag on every poll, so this variant dedups locally by default.

use serde_json::{json, Map, Value};
use std::time::Duration;

use super::polling::{PollReading, PollSchema, PollingConfig};
use super::types::FeedKind;

pub const ENDPOINT: &str = "https://cf.nascar.com/live/feeds/live-feed.json";

/// Key of the NASCAR update.
pub const UPDATE_KEY: &str = "NascarFlag";

const METADATA_FIELDS: [&str; 5] = ["lap_number", "elapsed_time", "race_id", "laps_in_race", "laps_to_go"];

/// Name of a NASCAR `flag_state` code.
pub fn flag_name(code: i64) -> &'static str {
    match code {
        0 => "None",
        1 => "Green",
        2 => "Yellow",
        3 => "Red",
        4 => "White",
        5 => "Checkered",
        6 => "Who Knows 1",
        7 => "Who Knows 2",
        8 => "Hot Track",
        9 => "Cold Track",
        _ => "UnAccounted For Flag",
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NascarSchema;

impl NascarSchema {
    pub fn default_config() -> PollingConfig {
        PollingConfig {
            endpoint: ENDPOINT.to_string(),
            headers: vec![("User-Agent".to_string(), "BestHTTP".to_string())],
            poll_interval: Duration::from_secs(5),
            no_session_interval: Duration::from_secs(30),
            error_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            dedup_locally: true,
        }
    }
}

impl PollSchema for NascarSchema {
    fn kind(&self) -> FeedKind {
        FeedKind::Nascar
    }

    fn tag(&self) -> &'static str {
        "[NASCAR]"
    }

    fn extract(&self, body: &Value) -> Option<PollReading> {
        let flag_state = body.get("flag_state").filter(|v| !v.is_null())?.clone();
        let name = flag_state.as_i64().map(flag_name).unwrap_or("UnAccounted For Flag");

        let mut flag = Map::new();
        flag.insert("flag_state".to_string(), flag_state.clone());
        flag.insert("flag_name".to_string(), json!(name));
        for field in METADATA_FIELDS {
            flag.insert(field.to_string(), body.get(field).cloned().unwrap_or(Value::Null));
        }

        let mut fields = Map::new();
        fields.insert(UPDATE_KEY.to_string(), Value::Object(flag));

        Some(PollReading {
            summary: format!("Flag: {} (code: {})", name, flag_state),
            status: flag_state,
            fields,
        })
    }
}
