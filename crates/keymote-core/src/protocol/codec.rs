//! Decode and encode step for the JSON wire protocol.
//!
//! Transports hand this module either raw text (WebSocket frames) or an
//! already-parsed [`serde_json::Value`] (peer data channel objects).  The
//! `"type"` string is checked against the known message types first, so a
//! type the host does not understand surfaces as
//! [`ProtocolError::UnknownMessageType`] rather than as a generic parse error.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::protocol::messages::{ClientMessage, ServerMessage, CLIENT_MESSAGE_TYPES};

/// Every `"type"` value a remote understands from the host.
pub const SERVER_MESSAGE_TYPES: &[&str] = &[
    "connected",
    "auth_result",
    "ping",
    "pong",
    "ack",
    "error",
    "screen-frame",
];

/// Errors that can occur while decoding or encoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The text is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The JSON is not an object with a string `"type"` field.
    #[error("message has no string \"type\" field")]
    MissingType,

    /// The `"type"` field names a message this side does not understand.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// The type is known but the remaining fields do not fit it.
    #[error("invalid {kind} message: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parses raw text into a JSON value without interpreting it.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] if the text is not JSON.
pub fn parse_value(text: &str) -> Result<Value, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::InvalidJson)
}

/// Returns the `"type"` string of a JSON message.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingType`] if `value` is not an object or its
/// `"type"` field is absent or not a string.
pub fn message_type(value: &Value) -> Result<&str, ProtocolError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)
}

/// Decodes a JSON value received from a remote into a [`ClientMessage`].
///
/// # Errors
///
/// - [`ProtocolError::MissingType`] if there is no `"type"` string.
/// - [`ProtocolError::UnknownMessageType`] if the type is not a client message.
/// - [`ProtocolError::InvalidPayload`] if the fields do not fit the type.
pub fn decode_client_value(value: Value) -> Result<ClientMessage, ProtocolError> {
    let kind = message_type(&value)?.to_string();
    if !CLIENT_MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownMessageType(kind));
    }
    trace!("decoding client message of type {kind}");
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Decodes one text frame received from a remote into a [`ClientMessage`].
///
/// # Errors
///
/// See [`parse_value`] and [`decode_client_value`].
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    decode_client_value(parse_value(text)?)
}

/// Decodes one text frame received from the host into a [`ServerMessage`].
///
/// # Errors
///
/// Same taxonomy as [`decode_client_value`], checked against the host-side
/// message types.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let value = parse_value(text)?;
    let kind = message_type(&value)?.to_string();
    if !SERVER_MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownMessageType(kind));
    }
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Serializes any protocol message to its JSON text form.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
