//! # Kasa Smart Bulb Gateway
//!
//! Speaks the legacy TP-Link smart home protocol on TCP port 9999. Every
//! message is a JSON document, framed as a big-endian `u32` length followed
//! by the payload run through an XOR autokey cipher seeded with 171.
//!
//! The connection is opened lazily and dropped on the first failure, so a
//! bulb that was unplugged comes back on the next flag change without any
//! extra bookkeeping.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::color_table::{ColorSpec, ColorTables};
use super::{ActuatorError, ActuatorGateway};
use crate::ingestors::types::{FeedKind, FlagCode};
use crate::loggers::LogSink;

pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const INITIAL_KEY: u8 = 171;
const MAX_FRAME: usize = 64 * 1024;
const LIGHTING_SERVICE: &str = "smartlife.iot.smartbulb.lightingservice";

/// Frames and encrypts a request.
pub fn encrypt(payload: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    for &byte in payload {
        key ^= byte;
        out.push(key);
    }
    out
}

/// Decrypts a frame body (without its length prefix).
pub fn decrypt(payload: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    payload
        .iter()
        .map(|&byte| {
            let plain = key ^ byte;
            key = byte;
            plain
        })
        .collect()
}

fn lighting_request(state: Value) -> Value {
    let mut request = serde_json::Map::new();
    request.insert(
        LIGHTING_SERVICE.to_string(),
        json!({ "transition_light_state": state }),
    );
    Value::Object(request)
}

/// Reads one length-prefixed frame and returns the still-encrypted body.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ActuatorError> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME {
        return Err(ActuatorError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Cloud account details. The local protocol does not authenticate, so they
/// are only carried for devices that will need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// `None` unless both parts are non-empty.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

pub struct KasaBulb {
    address: String,
    timeout: Duration,
    stream: Option<TcpStream>,
    alias: Option<String>,
    active_kind: FeedKind,
    tables: Arc<ColorTables>,
    credentials: Option<Credentials>,
}

impl KasaBulb {
    pub fn new(address: impl Into<String>, tables: Arc<ColorTables>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
            stream: None,
            alias: None,
            active_kind: FeedKind::F1,
            tables,
            credentials: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        if credentials.is_some() {
            log::info!("Kasa credentials supplied; the local protocol does not use them");
        }
        self.credentials = credentials;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn socket_address(&self) -> String {
        if self.address.contains(':') {
            self.address.clone()
        } else {
            format!("{}:{}", self.address, DEFAULT_PORT)
        }
    }

    async fn send_request(&mut self, request: &Value) -> Result<Value, ActuatorError> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(ActuatorError::NotConnected)?;
        let frame = encrypt(request.to_string().as_bytes());

        let exchange = async {
            stream.write_all(&frame).await?;
            read_frame(stream).await
        };
        let body = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ActuatorError::Timeout(timeout))??;

        let response: Value = serde_json::from_slice(&decrypt(&body))?;
        Ok(response)
    }

    async fn transition(&mut self, state: Value) -> Result<(), ActuatorError> {
        let response = self.send_request(&lighting_request(state)).await?;
        let err_code = response
            .pointer(&format!("/{LIGHTING_SERVICE}/transition_light_state/err_code"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if err_code != 0 {
            return Err(ActuatorError::Device(response.to_string()));
        }
        Ok(())
    }

    async fn handshake(&mut self) -> Result<String, ActuatorError> {
        let address = self.socket_address();
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(address.as_str()))
            .await
            .map_err(|_| ActuatorError::Timeout(self.timeout))??;
        self.stream = Some(stream);

        let info = self
            .send_request(&json!({"system": {"get_sysinfo": {}}}))
            .await?;
        let sysinfo = info
            .pointer("/system/get_sysinfo")
            .ok_or_else(|| ActuatorError::Device(info.to_string()))?;
        let alias = sysinfo
            .get("alias")
            .and_then(Value::as_str)
            .unwrap_or("Kasa Bulb")
            .to_string();

        let is_on = sysinfo
            .pointer("/light_state/on_off")
            .and_then(Value::as_i64)
            .unwrap_or(1)
            == 1;
        if !is_on {
            self.transition(json!({"on_off": 1, "transition_period": 0})).await?;
        }

        Ok(alias)
    }

    async fn apply(&mut self, color: &ColorSpec) -> Result<(), ActuatorError> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        self.transition(json!({
            "ignore_default": 1,
            "on_off": 1,
            "hue": color.hue,
            "saturation": color.saturation,
            "brightness": color.brightness,
            "color_temp": 0,
            "transition_period": 0
        }))
        .await
    }
}

#[async_trait]
impl ActuatorGateway for KasaBulb {
    async fn connect(&mut self) -> Result<String, ActuatorError> {
        if self.address.is_empty() {
            return Err(ActuatorError::NoAddress);
        }
        match self.handshake().await {
            Ok(alias) => {
                log::info!("Connected to Kasa bulb '{}' at {}", alias, self.address);
                self.alias = Some(alias.clone());
                Ok(alias)
            }
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    async fn set_color(&mut self, code: &FlagCode, log: &LogSink) {
        let Some(color) = self.tables.lookup(self.active_kind, code).cloned() else {
            log.warn(&format!("Unknown {} status code: {}", self.active_kind, code));
            return;
        };

        match self.apply(&color).await {
            Ok(()) => log.info(&format!("Bulb set to {} ({})", color.label, color.hex)),
            Err(e) => {
                self.stream = None;
                log.error(&format!("Error setting bulb color: {e}"));
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn update_address(&mut self, address: String) {
        self.stream = None;
        self.alias = None;
        self.address = address;
    }

    fn set_active_feed_kind(&mut self, kind: FeedKind) {
        self.active_kind = kind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[test]
    fn cipher_matches_known_vector() {
        assert_eq!(encrypt(b"{}"), vec![0, 0, 0, 2, 0xD0, 0xAD]);
        assert_eq!(decrypt(&[0xD0, 0xAD]), b"{}".to_vec());
    }

    /// A bulb on localhost that answers every request and records it.
    async fn fake_bulb(initially_on: bool) -> (String, Arc<Mutex<Vec<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            while let Ok(body) = read_frame(&mut socket).await {
                let request: Value = serde_json::from_slice(&decrypt(&body)).unwrap();
                let reply = if request.pointer("/system/get_sysinfo").is_some() {
                    let on_off = if initially_on { 1 } else { 0 };
                    json!({"system": {"get_sysinfo": {"alias": "Pit Wall", "light_state": {"on_off": on_off}}}})
                } else {
                    lighting_request(json!({"err_code": 0}))
                };
                recorded.lock().unwrap().push(request);
                socket
                    .write_all(&encrypt(reply.to_string().as_bytes()))
                    .await
                    .unwrap();
            }
        });

        (address, seen)
    }

    #[tokio::test]
    async fn connect_reads_alias_and_turns_bulb_on() {
        let (address, seen) = fake_bulb(false).await;
        let mut bulb = KasaBulb::new(address, Arc::new(ColorTables::default()));

        assert_eq!(bulb.connect().await.unwrap(), "Pit Wall");
        assert!(bulb.is_connected());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1].pointer("/smartlife.iot.smartbulb.lightingservice/transition_light_state/on_off"),
            Some(&json!(1))
        );
    }

    #[tokio::test]
    async fn set_color_uses_active_feed_table() {
        let (address, seen) = fake_bulb(true).await;
        let mut bulb = KasaBulb::new(address, Arc::new(ColorTables::default()));
        bulb.set_active_feed_kind(FeedKind::Nascar);

        bulb.set_color(&FlagCode::from("2"), &LogSink::discard()).await;

        let seen = seen.lock().unwrap();
        // Lazy connect (sysinfo) then the color change.
        assert_eq!(seen.len(), 2);
        let state = &seen[1][LIGHTING_SERVICE]["transition_light_state"];
        assert_eq!(state["hue"], 60);
        assert_eq!(state["saturation"], 100);
        assert_eq!(state["brightness"], 50);
    }

    #[tokio::test]
    async fn unreachable_bulb_logs_and_stays_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let lines = lines.clone();
            LogSink::new(move |msg| lines.lock().unwrap().push(msg.to_string()))
        };

        let mut bulb = KasaBulb::new(address, Arc::new(ColorTables::default()))
            .with_timeout(Duration::from_secs(1));
        bulb.set_color(&FlagCode::from("1"), &sink).await;

        assert!(!bulb.is_connected());
        assert!(lines.lock().unwrap().iter().any(|l| l.contains("Error setting bulb color")));
    }

    #[test]
    fn bare_host_gets_default_port() {
        let tables = Arc::new(ColorTables::default());
        assert_eq!(KasaBulb::new("192.168.1.20", tables.clone()).socket_address(), "192.168.1.20:9999");
        assert_eq!(KasaBulb::new("127.0.0.1:4000", tables).socket_address(), "127.0.0.1:4000");
    }
}
