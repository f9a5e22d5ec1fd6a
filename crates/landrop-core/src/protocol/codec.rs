//! JSON codec for encoding and decoding LanDrop wire messages.
//!
//! Every message is one UTF-8 JSON object. Encoding cannot produce partial
//! output; decoding fails with [`CodecError::MalformedMessage`] when the
//! payload is not valid JSON or is missing any required field of every
//! known shape.

use thiserror::Error;

use crate::protocol::messages::WireMessage;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not valid JSON, or no message shape's required fields
    /// are all present.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Encodes a [`WireMessage`] into the bytes of one JSON object.
///
/// # Errors
///
/// Returns [`CodecError::MalformedMessage`] if serialization fails (not
/// reachable for well-formed message values; kept for API symmetry).
pub fn encode(msg: &WireMessage) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(msg).map_err(|e| CodecError::MalformedMessage(e.to_string()))
}

/// Decodes one [`WireMessage`] from `bytes`.
///
/// # Errors
///
/// Returns [`CodecError::MalformedMessage`] for invalid JSON or a JSON
/// object that matches none of the three wire shapes.
///
/// # Examples
///
/// ```rust
/// use landrop_core::protocol::{decode, encode};
/// use landrop_core::{ControlRequest, RequestKind, WireMessage};
///
/// let msg = WireMessage::from(ControlRequest::new(RequestKind::Ping));
/// let bytes = encode(&msg).unwrap();
/// assert_eq!(decode(&bytes).unwrap(), msg);
/// ```
pub fn decode(bytes: &[u8]) -> Result<WireMessage, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedMessage(e.to_string()))
}

/// Decodes one [`WireMessage`] from the beginning of `bytes`, tolerating
/// trailing data.
///
/// Returns the message and the number of bytes consumed so the caller can
/// hand the remainder to whatever follows the message in the stream (a
/// `SendFile` request may share its read with the first file bytes, since
/// the sender writes them back to back).
///
/// # Errors
///
/// Returns [`CodecError::MalformedMessage`] if the buffer does not start
/// with a complete JSON object matching one of the wire shapes.
pub fn decode_prefix(bytes: &[u8]) -> Result<(WireMessage, usize), CodecError> {
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<WireMessage>();
    match stream.next() {
        Some(Ok(msg)) => Ok((msg, stream.byte_offset())),
        Some(Err(e)) => Err(CodecError::MalformedMessage(e.to_string())),
        None => Err(CodecError::MalformedMessage("empty payload".to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
