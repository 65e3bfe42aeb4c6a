//! Payload rules at the application boundary.
//!
//! Payloads are opaque bytes. The session only checks that a payload is
//! non-empty and fits in a single user-forward message; text encodings are
//! decoded at the outer edge with [`decode_hex`] before reaching a session.

use thiserror::Error;

/// Largest payload a session accepts by default.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("payload is empty")]
    Empty,

    #[error("payload is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },

    #[error("payload is not valid hex: {0}")]
    InvalidHex(String),
}

/// Check a raw payload against the session's size limit.
pub fn validate_payload(payload: &[u8], max_len: usize) -> Result<(), EncodingError> {
    if payload.is_empty() {
        return Err(EncodingError::Empty);
    }
    if payload.len() > max_len {
        return Err(EncodingError::TooLarge {
            len: payload.len(),
            max: max_len,
        });
    }
    Ok(())
}

/// Decode a hex payload typed at the CLI.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, EncodingError> {
    hex::decode(text.trim()).map_err(|e| EncodingError::InvalidHex(e.to_string()))
}
