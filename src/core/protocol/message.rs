// src/core/protocol/message.rs

//! Parses one inbound line into a command name and an opaque payload.
//!
//! Inbound lines are JSON objects carrying at least a string `cmd` field. The
//! codec only interprets that one field; the handler receives the full line,
//! untouched, as its payload.

use crate::core::errors::MalformedMessage;
use serde_json::{Map, Value};

/// The field that names the command in every inbound frame.
pub const COMMAND_FIELD: &str = "cmd";

/// A successfully parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The value of the `cmd` field. Case-sensitive.
    pub command: String,
    /// The original encoding of the frame, passed through to the handler.
    pub payload: String,
}

/// Turns one inbound frame into text. A trailing carriage return is dropped,
/// so `\r\n`-terminated clients work, and bytes that are not UTF-8 are
/// rejected like any other malformed line.
pub fn decode_line(frame: &[u8]) -> Result<&str, MalformedMessage> {
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
    std::str::from_utf8(frame).map_err(|e| MalformedMessage::InvalidEncoding(e.to_string()))
}

/// Parses a raw line into a `Message`.
///
/// Fails if the line is not a syntactically valid JSON object, or if the
/// `cmd` field is absent or not a string. Deterministic and side-effect free.
pub fn parse(raw: &str) -> Result<Message, MalformedMessage> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| MalformedMessage::InvalidSyntax(e.to_string()))?;
    let object: &Map<String, Value> = value.as_object().ok_or(MalformedMessage::NotAnObject)?;

    match object.get(COMMAND_FIELD) {
        Some(Value::String(command)) => Ok(Message {
            command: command.clone(),
            payload: raw.to_string(),
        }),
        Some(_) => Err(MalformedMessage::CommandNotString),
        None => Err(MalformedMessage::MissingCommand),
    }
}

/// Reads a string field out of a payload, for handlers that expect one.
/// Returns `None` when the payload is not an object or the field is not a string.
pub fn payload_field(payload: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    value.get(field)?.as_str().map(str::to_string)
}
