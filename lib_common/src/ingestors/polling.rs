//! # Self-Scheduling Polling Ingestor
//!
//! Shared run loop for REST feeds that have no streaming interface. The loop
//! issues one bounded `GET` per cycle, hands the body to a feed-specific
//! [`PollSchema`], and then sleeps for a delay that depends on the cycle's
//! outcome:
//!
//! | outcome                          | connected | next delay            |
//! |----------------------------------|-----------|-----------------------|
//! | 2xx, status field present        | true      | `poll_interval`       |
//! | 2xx, status field absent         | true      | `poll_interval`       |
//! | 2xx, body not JSON               | unchanged | `poll_interval`       |
//! | 403 / 404 (no active session)    | false     | `no_session_interval` |
//! | other non-2xx                    | false     | `poll_interval`       |
//! | transport error or timeout       | false     | `error_interval`      |
//!
//! An absent status field means "no session", not an error, and never
//! produces an update. With `dedup_locally` set, a status equal to the
//! previous cycle's is not emitted again.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use std::time::Duration;

use super::monitor::{FeedError, FeedMonitor, MonitorContext};
use super::types::{ConnectionState, FeedKind, Update};
use crate::retrieve::{ApiClient, FetchError};

/// HTTP statuses a polled endpoint uses to say no session is running.
pub const NO_SESSION_STATUSES: [u16; 2] = [403, 404];

/// What a schema extracted from one successful poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReading {
    /// The raw status value, compared between cycles for local dedup.
    pub status: Value,
    /// Fields of the update to emit.
    pub fields: Map<String, Value>,
    /// Human-readable line for the log sink.
    pub summary: String,
}

/// Feed-specific knowledge plugged into [`PollingMonitor`].
pub trait PollSchema: Send + Sync + 'static {
    fn kind(&self) -> FeedKind;

    /// Log prefix, e.g. `"[NASCAR]"`.
    fn tag(&self) -> &'static str;

    /// Pulls the status out of a response body. `None` when the status field
    /// is absent.
    fn extract(&self, body: &Value) -> Option<PollReading>;
}

/// Endpoint and timings of one polled feed.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub poll_interval: Duration,
    pub no_session_interval: Duration,
    pub error_interval: Duration,
    pub request_timeout: Duration,
    pub dedup_locally: bool,
}

pub struct PollingMonitor<S: PollSchema> {
    schema: S,
    config: PollingConfig,
    client: ApiClient,
    connection: ConnectionState,
    last_status: Option<Value>,
}

impl<S: PollSchema> PollingMonitor<S> {
    pub fn new(schema: S, config: PollingConfig) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FeedError::Header(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FeedError::Header(format!("{name}: {e}")))?;
            headers.insert(name, value);
        }
        let client = ApiClient::new(&config.endpoint, headers, config.request_timeout, 0)?;

        Ok(Self {
            schema,
            config,
            client,
            connection: ConnectionState::new(),
            last_status: None,
        })
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }
}

#[async_trait]
impl<S: PollSchema> FeedMonitor for PollingMonitor<S> {
    fn kind(&self) -> FeedKind {
        self.schema.kind()
    }

    fn connection(&self) -> ConnectionState {
        self.connection.clone()
    }

    async fn run(&mut self, ctx: MonitorContext) {
        let log = ctx.log().clone();
        let tag = self.schema.tag();
        log.info(&format!(
            "{} Monitor started, polling every {}s",
            tag,
            self.config.poll_interval.as_secs()
        ));

        while !ctx.is_cancelled() {
            log.debug(&format!("{tag} Fetching status..."));
            let fetched = tokio::select! {
                _ = ctx.cancelled() => break,
                fetched = self.client.get::<Value>("") => fetched,
            };

            let delay = match fetched {
                Ok(response) if response.success => {
                    self.connection.set_connected(true);
                    let reading = response
                        .data
                        .as_ref()
                        .and_then(|body| self.schema.extract(body));
                    match reading {
                        Some(reading)
                            if self.config.dedup_locally
                                && self.last_status.as_ref() == Some(&reading.status) =>
                        {
                            log.debug(&format!("{tag} Status unchanged ({})", reading.status));
                        }
                        Some(reading) => {
                            log.info(&format!("{} {}", tag, reading.summary));
                            self.last_status = Some(reading.status);
                            let update = Update::new(self.schema.kind(), reading.fields);
                            if !ctx.emit(update).await {
                                break;
                            }
                        }
                        None => log.debug(&format!("{tag} No status in response; no session running")),
                    }
                    self.config.poll_interval
                }
                Ok(response) if NO_SESSION_STATUSES.contains(&response.status) => {
                    self.connection.set_connected(false);
                    log.warn(&format!("{tag} No active session at the moment."));
                    self.config.no_session_interval
                }
                Ok(response) => {
                    self.connection.set_connected(false);
                    log.warn(&format!("{} HTTP error {}", tag, response.status));
                    self.config.poll_interval
                }
                Err(FetchError::Decode { status, .. }) => {
                    log.warn(&format!("{tag} Response (HTTP {status}) is not valid JSON."));
                    self.config.poll_interval
                }
                Err(e) => {
                    self.connection.set_connected(false);
                    log.error(&format!(
                        "{} Error fetching data: {}. Retrying in {}s...",
                        tag,
                        e,
                        self.config.error_interval.as_secs()
                    ));
                    self.config.error_interval
                }
            };

            if !ctx.sleep(delay).await {
                break;
            }
        }

        self.connection.set_connected(false);
        log.info(&format!("{tag} Monitor stopped"));
    }
}
