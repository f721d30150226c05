//! # Compressed Frame Decoder
//!
//! F1 live timing ships its bulky topics (and anything subscribed as
//! `Topic.z`) as base64 text wrapping a *raw* deflate stream: no zlib header,
//! no trailer. The inflated bytes are UTF-8 JSON.
//!
//! A decode failure means "no data" for that field. Callers drop the field
//! and keep the connection.

use base64::{engine::general_purpose, Engine as _};
use flate2::read::DeflateDecoder;
use serde_json::Value;
use std::io::Read;
use thiserror::Error;

/// Suffix marking a compressed field name.
pub const COMPRESSED_SUFFIX: &str = ".z";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("raw deflate stream could not be inflated: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("inflated payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("inflated payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a base64, raw-deflate compressed JSON document.
pub fn decode(payload: &str) -> Result<Value, DecodeError> {
    let compressed = general_purpose::STANDARD.decode(payload.trim())?;

    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut inflated)?;

    let text = String::from_utf8(inflated)?;
    Ok(serde_json::from_str(&text)?)
}

/// Splits `"TrackStatus.z"` into `Some("TrackStatus")`; plain names give `None`.
pub fn strip_compressed_suffix(field: &str) -> Option<&str> {
    field.strip_suffix(COMPRESSED_SUFFIX)
}

#[cfg(test)]
pub(crate) fn encode_for_tests(value: &Value) -> String {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(value.to_string().as_bytes())
        .expect("in-memory write");
    let compressed = encoder.finish().expect("in-memory finish");
    general_purpose::STANDARD.encode(compressed)
}
