//! # MotoGP Live Timing (lite)
//!
//! Polls the pulselive timing gateway. The status is
//! `head.session_status_id`. The gateway answers 403/404 between sessions,
//! and the shared loop turns that into the long no-session interval. The
//! endpoint rejects requests that do not look like they come from the
//! motogp.com site, hence the browser headers.

use serde_json::{Map, Value};
use std::time::Duration;

use super::polling::{PollReading, PollSchema, PollingConfig};
use super::types::{FeedKind, FlagCode};

pub const ENDPOINT: &str = "https://api.motogp.pulselive.com/motogp/v1/timing-gateway/livetiming-lite";

/// Key of the MotoGP update.
pub const UPDATE_KEY: &str = "MotoGPStatus";

#[derive(Debug, Clone, Copy, Default)]
pub struct MotoGpSchema;

impl MotoGpSchema {
    pub fn default_config() -> PollingConfig {
        PollingConfig {
            endpoint: ENDPOINT.to_string(),
            headers: vec![
                (
                    "User-Agent".to_string(),
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
                ),
                ("Accept".to_string(), "application/json".to_string()),
                ("Origin".to_string(), "https://www.motogp.com".to_string()),
                ("Referer".to_string(), "https://www.motogp.com/".to_string()),
            ],
            poll_interval: Duration::from_secs(10),
            no_session_interval: Duration::from_secs(30),
            error_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            dedup_locally: true,
        }
    }
}

impl PollSchema for MotoGpSchema {
    fn kind(&self) -> FeedKind {
        FeedKind::MotoGp
    }

    fn tag(&self) -> &'static str {
        "[MotoGP]"
    }

    fn extract(&self, body: &Value) -> Option<PollReading> {
        let head = body.get("head")?;
        let status = head.get("session_status_id")?;
        // Empty ids mean nothing is running yet.
        FlagCode::from_value(status)?;

        let mut inner = Map::new();
        inner.insert("Status".to_string(), status.clone());
        if let Some(name) = head.get("session_status_name").filter(|v| !v.is_null()) {
            inner.insert("Name".to_string(), name.clone());
        }

        let mut fields = Map::new();
        fields.insert(UPDATE_KEY.to_string(), Value::Object(inner));

        Some(PollReading {
            summary: format!("Session status: {}", status),
            status: status.clone(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_session_status() {
        let body = json!({"head": {"session_status_id": "I", "session_status_name": "In progress"}, "rider": {}});
        let reading = MotoGpSchema.extract(&body).unwrap();
        assert_eq!(reading.status, json!("I"));
        assert_eq!(reading.fields[UPDATE_KEY], json!({"Status": "I", "Name": "In progress"}));
    }

    #[test]
    fn missing_or_empty_status_is_no_reading() {
        assert!(MotoGpSchema.extract(&json!({})).is_none());
        assert!(MotoGpSchema.extract(&json!({"head": {}})).is_none());
        assert!(MotoGpSchema.extract(&json!({"head": {"session_status_id": ""}})).is_none());
    }
}
