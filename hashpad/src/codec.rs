//! Lossless mapping between document text and a fragment-safe string.
//!
//! Pipeline: UTF-8 bytes, gzip, then unpadded URL-safe base64. The output alphabet is
//! `[A-Za-z0-9_-]`, so it can sit in a URL fragment without escaping.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use thiserror::Error;
use tracing::warn;

pub const MAX_DECODED_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to compress document: {0}")]
    Compress(std::io::Error),
    #[error("channel value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decompress channel value: {0}")]
    Decompress(std::io::Error),
    #[error("decoded document exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("decoded document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn try_encode(text: &str) -> Result<String, CodecError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(text.as_bytes())
        .map_err(CodecError::Compress)?;
    let compressed = encoder.finish().map_err(CodecError::Compress)?;

    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

pub fn try_decode(channel_value: &str, max_bytes: usize) -> Result<String, CodecError> {
    if channel_value.is_empty() {
        return Ok(String::new());
    }

    let compressed = URL_SAFE_NO_PAD.decode(channel_value.as_bytes())?;
    let decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .take(max_bytes.saturating_add(1) as u64)
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    if out.len() > max_bytes {
        return Err(CodecError::PayloadTooLarge { limit: max_bytes });
    }

    Ok(String::from_utf8(out)?)
}

/// Encodes `text`; an empty result for non-empty input means "cannot be persisted right now".
pub fn encode(text: &str) -> String {
    match try_encode(text) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!("document encode failed: {err}");
            String::new()
        }
    }
}

/// Decodes a channel value; an empty result for non-empty input means the value is unreadable.
pub fn decode(channel_value: &str) -> String {
    decode_with_limit(channel_value, MAX_DECODED_BYTES)
}

pub fn decode_with_limit(channel_value: &str, max_bytes: usize) -> String {
    match try_decode(channel_value, max_bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!(len = channel_value.len(), "channel decode failed: {err}");
            String::new()
        }
    }
}

pub fn is_channel_safe(value: &str) -> bool {
    value
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
}
