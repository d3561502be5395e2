//! Body encoding for tunneled requests
//!
//! Binary request bodies travel inside the JSON command as base64. The
//! encoder consumes the input in fixed 32 KiB windows; the streaming
//! writer carries the 0-2 leftover bytes of each window into the next one,
//! so window edges never introduce padding in the middle of the output.

use crate::utils::error::{BridgeError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderStringWriter;
use base64::Engine as _;
use bytes::Bytes;
use std::io::Write;

/// Size of one encoding window
pub const BASE64_CHUNK_SIZE: usize = 32 * 1024;

/// Encode a binary body window by window
pub fn encode_body(bytes: &[u8]) -> Result<String> {
    let mut encoder = EncoderStringWriter::new(&STANDARD);
    for window in bytes.chunks(BASE64_CHUNK_SIZE) {
        encoder
            .write_all(window)
            .map_err(|e| BridgeError::protocol(format!("base64 encoding failed: {}", e)))?;
    }
    Ok(encoder.into_inner())
}

/// Decode a `base64` response body
pub fn decode_body(encoded: &str) -> Result<Bytes> {
    Ok(Bytes::from(STANDARD.decode(encoded.trim())?))
}
