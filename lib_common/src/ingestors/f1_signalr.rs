//! # F1 Live Timing SignalR Ingestor
//!
//! Push-based client for the Formula 1 live timing hub. One session is:
//!
//! 1. **Negotiate**: `GET {base}/negotiate` for a `ConnectionToken`. A missing
//!    token means no session is live. That is a "come back later" condition,
//!    so it gets a long backoff instead of the short transport-error one.
//! 2. **Connect**: open the websocket with the token, mark the monitor
//!    connected, and send the `Subscribe` control envelope.
//! 3. **Read**: every text frame goes through [`parse_frame`]. Frames that do
//!    not parse are dropped without touching the connection, because one bad
//!    frame must not end a multi-hour session.
//!
//! Any failure returns to Disconnected, clears the connected flag and retries
//! after the error backoff. The loop only ends on cancellation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::USER_AGENT, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use super::frame_decoder::{decode, strip_compressed_suffix};
use super::monitor::{FeedError, FeedMonitor, MonitorContext};
use super::types::{ConnectionState, FeedKind, Update};
use crate::retrieve::ApiClient;

/// Request id of the subscribe call; the bulk snapshot reply echoes it.
pub const SUBSCRIBE_ID: &str = "1";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for the F1 SignalR stream.
#[derive(Debug, Clone)]
pub struct F1Config {
    /// SignalR endpoint root, e.g. `https://livetiming.formula1.com/signalr`.
    pub base_url: String,
    /// Websocket root. Derived from `base_url` (https -> wss) when `None`.
    pub stream_url: Option<String>,
    pub hub: String,
    pub topics: Vec<String>,
    pub user_agent: String,
    pub client_protocol: String,
    /// Wait after a negotiation that found no live session.
    pub no_session_backoff: Duration,
    /// Wait after any transport or protocol error.
    pub error_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for F1Config {
    fn default() -> Self {
        Self {
            base_url: "https://livetiming.formula1.com/signalr".to_string(),
            stream_url: None,
            hub: "Streaming".to_string(),
            topics: vec![
                "TrackStatus".to_string(),
                "RaceControlMessages".to_string(),
                "SessionInfo".to_string(),
            ],
            user_agent: "BestHTTP".to_string(),
            client_protocol: "1.5".to_string(),
            no_session_backoff: Duration::from_secs(60),
            error_backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl F1Config {
    fn connection_data(&self) -> String {
        json!([{ "name": self.hub }]).to_string()
    }

    fn negotiate_url(&self) -> Result<Url, url::ParseError> {
        let base = format!("{}/negotiate", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("connectionData", self.connection_data()),
                ("clientProtocol", self.client_protocol.clone()),
            ],
        )
    }

    /// The websocket URL for a negotiated session token.
    pub fn connect_url(&self, token: &str) -> Result<Url, url::ParseError> {
        let root = match &self.stream_url {
            Some(stream) => stream.trim_end_matches('/').to_string(),
            None => {
                let base = self.base_url.trim_end_matches('/');
                if let Some(rest) = base.strip_prefix("https://") {
                    format!("wss://{rest}")
                } else if let Some(rest) = base.strip_prefix("http://") {
                    format!("ws://{rest}")
                } else {
                    base.to_string()
                }
            }
        };
        Url::parse_with_params(
            &format!("{root}/connect"),
            &[
                ("clientProtocol", self.client_protocol.clone()),
                ("transport", "webSockets".to_string()),
                ("connectionToken", token.to_string()),
                ("connectionData", self.connection_data()),
            ],
        )
    }

    /// The `Subscribe` control envelope sent right after connecting.
    pub fn subscribe_message(&self) -> Value {
        json!({
            "H": self.hub,
            "M": "Subscribe",
            "A": [self.topics],
            "I": SUBSCRIBE_ID,
        })
    }
}

/// The F1 streaming monitor.
pub struct F1SignalRMonitor {
    config: F1Config,
    negotiator: ApiClient,
    connection: ConnectionState,
}

impl F1SignalRMonitor {
    pub fn new(config: F1Config) -> Result<Self, FeedError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let user_agent = reqwest::header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| FeedError::Header(e.to_string()))?;
        headers.insert(reqwest::header::USER_AGENT, user_agent);

        let negotiate_url = config.negotiate_url()?;
        let negotiator = ApiClient::new(negotiate_url.as_str(), headers, config.request_timeout, 0)?;

        Ok(Self {
            config,
            negotiator,
            connection: ConnectionState::new(),
        })
    }

    async fn negotiate(&self) -> Result<String, FeedError> {
        let response = self.negotiator.get::<Value>("").await?;
        if !response.success {
            return Err(FeedError::NegotiationStatus(response.status));
        }
        response
            .data
            .as_ref()
            .and_then(|body| body.get("ConnectionToken"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or(FeedError::NoActiveSession)
    }

    /// One negotiate/connect/read cycle. `Ok(())` means the monitor should stop.
    async fn session(&self, ctx: &MonitorContext) -> Result<(), FeedError> {
        let log = ctx.log();

        log.info("[F1] Negotiating with the server...");
        let token = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            token = self.negotiate() => token?,
        };

        let url = self.config.connect_url(&token)?;
        let mut request = url.as_str().into_client_request()?;
        let user_agent = HeaderValue::from_str(&self.config.user_agent)
            .map_err(|e| FeedError::Header(e.to_string()))?;
        request.headers_mut().insert(USER_AGENT, user_agent);

        log.info("[F1] Connecting to the WebSocket...");
        let (ws_stream, _) = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            connected = tokio::time::timeout(self.config.request_timeout, connect_async(request)) => {
                connected.map_err(|_| FeedError::Timeout(self.config.request_timeout))??
            }
        };
        self.connection.set_connected(true);
        log.info("[F1] Connection established");

        let (mut write, mut read) = ws_stream.split();
        let subscribe = self.config.subscribe_message().to_string();
        write.send(Message::Text(subscribe.into())).await?;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await;
                    return Ok(());
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        for update in parse_frame(text.as_str()) {
                            if !ctx.emit(update).await {
                                let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.close()).await;
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
}

#[async_trait]
impl FeedMonitor for F1SignalRMonitor {
    fn kind(&self) -> FeedKind {
        FeedKind::F1
    }

    fn connection(&self) -> ConnectionState {
        self.connection.clone()
    }

    async fn run(&mut self, ctx: MonitorContext) {
        let log = ctx.log().clone();

        while !ctx.is_cancelled() {
            let outcome = self.session(&ctx).await;
            self.connection.set_connected(false);

            let backoff = match outcome {
                Ok(()) => break,
                Err(FeedError::NoActiveSession) => {
                    log.warn(&format!(
                        "[F1] No active session. Retrying in {}s...",
                        self.config.no_session_backoff.as_secs()
                    ));
                    self.config.no_session_backoff
                }
                Err(e) => {
                    log.error(&format!(
                        "[F1 Error] {}. Reconnecting in {}s...",
                        e,
                        self.config.error_backoff.as_secs()
                    ));
                    self.config.error_backoff
                }
            };

            if !ctx.sleep(backoff).await {
                break;
            }
        }

        self.connection.set_connected(false);
        log.info("[F1] Monitor stopped");
    }
}

/// Turns one SignalR text frame into zero or more updates.
///
/// - `{"M":[{"M":"feed","A":[field, value, ..]}, ..]}` gives one update per feed entry.
/// - `{"R":{..},"I":"1"}` (the subscribe reply) gives one aggregated update.
///
/// Anything else, including invalid JSON and keep-alives, gives nothing.
pub fn parse_frame(text: &str) -> Vec<Update> {
    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        log::debug!("[F1] Dropping non-JSON frame ({} bytes)", text.len());
        return Vec::new();
    };

    if let Some(messages) = parsed.get("M").and_then(Value::as_array) {
        return messages.iter().filter_map(parse_feed_message).collect();
    }

    if let Some(bulk) = parsed.get("R").and_then(Value::as_object) {
        if is_subscribe_reply(parsed.get("I")) {
            let fields: Map<String, Value> = bulk
                .iter()
                .filter_map(|(field, value)| normalize_field(field, value.clone()))
                .collect();
            if !fields.is_empty() {
                return vec![Update::new(FeedKind::F1, fields)];
            }
        }
    }

    Vec::new()
}

fn parse_feed_message(message: &Value) -> Option<Update> {
    if message.get("M").and_then(Value::as_str) != Some("feed") {
        return None;
    }
    // A: [topic, payload, timestamp?]
    let args = message.get("A")?.as_array()?;
    let field = args.first()?.as_str()?;
    let value = args.get(1)?.clone();
    let (field, value) = normalize_field(field, value)?;
    Some(Update::single(FeedKind::F1, field, value))
}

/// Decodes `.z` fields and strips the marker; undecodable fields are dropped.
fn normalize_field(field: &str, value: Value) -> Option<(String, Value)> {
    match strip_compressed_suffix(field) {
        Some(name) => {
            let payload = value.as_str()?;
            match decode(payload) {
                Ok(decoded) => Some((name.to_string(), decoded)),
                Err(e) => {
                    log::debug!("[F1] Dropping field {}: {}", field, e);
                    None
                }
            }
        }
        None => Some((field.to_string(), value)),
    }
}

fn is_subscribe_reply(id: Option<&Value>) -> bool {
    match id {
        Some(Value::String(s)) => s == SUBSCRIBE_ID,
        Some(Value::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestors::frame_decoder::encode_for_tests;

    #[test]
    fn bulk_reply_is_one_update_with_decoded_fields() {
        let encoded = encode_for_tests(&json!({"Status": "1", "Message": "AllClear"}));
        let frame = json!({
            "R": {"TrackStatus.z": encoded, "SessionInfo": {"Name": "Race"}},
            "I": "1"
        })
        .to_string();

        let updates = parse_frame(&frame);
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.feed_kind, FeedKind::F1);
        assert_eq!(update.get("TrackStatus"), Some(&json!({"Status": "1", "Message": "AllClear"})));
        assert!(update.get("TrackStatus.z").is_none());
        assert_eq!(update.get("SessionInfo"), Some(&json!({"Name": "Race"})));
    }

    #[test]
    fn bulk_reply_accepts_numeric_id_and_ignores_other_ids() {
        let numeric = json!({"R": {"TrackStatus": {"Status": "2"}}, "I": 1}).to_string();
        assert_eq!(parse_frame(&numeric).len(), 1);

        let other = json!({"R": {"TrackStatus": {"Status": "2"}}, "I": "7"}).to_string();
        assert!(parse_frame(&other).is_empty());
    }

    #[test]
    fn incremental_messages_each_become_an_update() {
        let encoded = encode_for_tests(&json!({"Status": "5"}));
        let frame = json!({
            "C": "d-1",
            "M": [
                {"H": "Streaming", "M": "feed", "A": ["TrackStatus", {"Status": "4"}, "2024-05-26T13:00:00Z"]},
                {"H": "Streaming", "M": "feed", "A": ["TrackStatus.z", encoded]},
                {"H": "Streaming", "M": "other", "A": ["TrackStatus", {"Status": "1"}]}
            ]
        })
        .to_string();

        let updates = parse_frame(&frame);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].get("TrackStatus"), Some(&json!({"Status": "4"})));
        assert_eq!(updates[1].get("TrackStatus"), Some(&json!({"Status": "5"})));
    }

    #[test]
    fn malformed_frames_and_fields_are_dropped() {
        assert!(parse_frame("not json").is_empty());
        assert!(parse_frame("{}").is_empty());
        assert!(parse_frame(r#"{"M":[{"M":"feed","A":["TrackStatus"]}]}"#).is_empty());

        let frame = json!({"M": [{"M": "feed", "A": ["TrackStatus.z", "%%%"]}]}).to_string();
        assert!(parse_frame(&frame).is_empty());
    }

    #[test]
    fn builds_signalr_urls_and_subscribe_envelope() {
        let config = F1Config::default();

        let negotiate = config.negotiate_url().unwrap();
        assert_eq!(negotiate.path(), "/signalr/negotiate");
        let pairs: Vec<(String, String)> = negotiate.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("connectionData".into(), r#"[{"name":"Streaming"}]"#.into())));
        assert!(pairs.contains(&("clientProtocol".into(), "1.5".into())));

        let connect = config.connect_url("a+b/c=").unwrap();
        assert_eq!(connect.scheme(), "wss");
        assert_eq!(connect.path(), "/signalr/connect");
        let pairs: Vec<(String, String)> = connect.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("transport".into(), "webSockets".into())));
        assert!(pairs.contains(&("connectionToken".into(), "a+b/c=".into())));

        let subscribe = config.subscribe_message();
        assert_eq!(subscribe["M"], "Subscribe");
        assert_eq!(subscribe["I"], SUBSCRIBE_ID);
        assert_eq!(subscribe["A"][0][0], "TrackStatus");
    }
}
