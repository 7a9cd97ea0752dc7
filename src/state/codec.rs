//! State codec
//!
//! Serializes and deserializes the persisted sync-progress blob. When
//! compression is enabled the blob is wrapped as
//! `{"format": "base64/gzip", "data": "<base64>"}`; decoding accepts both the
//! wrapped and the raw form.

use super::types::SyncState;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use std::io::{Read, Write};

/// Format tag of a compressed blob
pub const COMPRESSED_FORMAT: &str = "base64/gzip";

/// Whether a blob is in the compressed wrapper form
pub fn is_compressed(blob: &JsonValue) -> bool {
    blob.get("format").and_then(JsonValue::as_str) == Some(COMPRESSED_FORMAT)
        && blob.get("data").is_some_and(JsonValue::is_string)
}

/// Gzip and base64-encode any JSON value
pub fn compress(value: &JsonValue) -> Result<JsonValue> {
    let raw = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let zipped = encoder.finish()?;

    Ok(json!({
        "format": COMPRESSED_FORMAT,
        "data": base64::engine::general_purpose::STANDARD.encode(zipped),
    }))
}

/// Undo [`compress`]; values not in the wrapper form are returned unchanged
pub fn decompress(blob: JsonValue) -> Result<JsonValue> {
    if !is_compressed(&blob) {
        return Ok(blob);
    }

    let data = blob
        .get("data")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    let zipped = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::state(format!("Invalid base64 in compressed state: {e}")))?;

    let mut raw = String::new();
    GzDecoder::new(zipped.as_slice())
        .read_to_string(&mut raw)
        .map_err(|e| Error::state(format!("Invalid gzip in compressed state: {e}")))?;

    serde_json::from_str(&raw)
        .map_err(|e| Error::state(format!("Invalid JSON in compressed state: {e}")))
}

/// Encode sync state for emission, optionally compressed
pub fn encode(state: &SyncState, compressed: bool) -> Result<JsonValue> {
    let value = serde_json::to_value(state)?;
    if compressed {
        compress(&value)
    } else {
        Ok(value)
    }
}

/// Decode a persisted blob; absent or null blobs yield empty state
pub fn decode(blob: Option<JsonValue>) -> Result<SyncState> {
    match blob {
        None | Some(JsonValue::Null) => Ok(SyncState::new()),
        Some(blob) => serde_json::from_value(decompress(blob)?)
            .map_err(|e| Error::state(format!("Failed to parse state: {e}"))),
    }
}
