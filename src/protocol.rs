//! Wire protocol between the server and its observers.
//!
//! Every frame is one JSON object. Outbound messages carry a
//! `MESSAGE_TYPE` key:
//!
//! ```text
//! {"MESSAGE_TYPE":"NOTIFY","DEVICE_OPEN":true}
//! {"MESSAGE_TYPE":"REPLY","DEVICE_ARMED":true,"DEVICE_ENABLED":false}
//! ```
//!
//! Inbound messages are partial updates using the same `DEVICE_*` keys;
//! any key may be omitted and unknown keys are ignored.
//!
//! REPLY is only sent in response to a client command, NOTIFY only when the
//! poller records a transition, so a client can always tell why it got an
//! update.

use crate::error::DecodeError;
use crate::state::{DeviceSnapshot, SharedDeviceState, StateUpdate, TriState};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MESSAGE_TYPE_KEY: &str = "MESSAGE_TYPE";
pub const DEVICE_OPEN_KEY: &str = "DEVICE_OPEN";
pub const DEVICE_ARMED_KEY: &str = "DEVICE_ARMED";
pub const DEVICE_ENABLED_KEY: &str = "DEVICE_ENABLED";

/// Messages the server sends to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
#[serde(tag = "MESSAGE_TYPE", rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum OutboundMessage {
    /// The sensor line changed while armed and enabled.
    Notify {
        #[serde(rename = "DEVICE_OPEN")]
        open: TriState,
    },
    /// Current configuration, sent after every client command.
    Reply {
        #[serde(rename = "DEVICE_ARMED")]
        armed: TriState,
        #[serde(rename = "DEVICE_ENABLED")]
        enabled: TriState,
    },
}

impl OutboundMessage {
    pub fn to_json(&self) -> String {
        // Serializing a flat enum of Option<bool> fields cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A decoded client command. `None` fields were absent (or null).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    #[serde(rename = "DEVICE_OPEN", skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
    #[serde(rename = "DEVICE_ARMED", skip_serializing_if = "Option::is_none")]
    pub armed: Option<bool>,
    #[serde(rename = "DEVICE_ENABLED", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn bool_field(object: &Map<String, Value>, key: &'static str) -> Result<Option<bool>, DecodeError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => bool::deserialize(value)
            .map(Some)
            .map_err(|source| DecodeError::InvalidField { key, source }),
    }
}

/// Decode a raw text frame into a command.
pub fn decode_inbound(raw: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let object = match &value {
        Value::Object(object) => object,
        other => return Err(DecodeError::NotAnObject(json_kind(other))),
    };

    Ok(InboundMessage {
        open: bool_field(object, DEVICE_OPEN_KEY)?,
        armed: bool_field(object, DEVICE_ARMED_KEY)?,
        enabled: bool_field(object, DEVICE_ENABLED_KEY)?,
    })
}

/// Encode a command the way a client sends it.
pub fn encode_inbound(message: &InboundMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string())
}

/// Apply a decoded command to the shared state.
///
/// `DEVICE_OPEN` is only honoured when `accept_client_open` is set;
/// otherwise the line stays the sole writer of `open`.
pub fn apply_inbound(
    state: &SharedDeviceState,
    message: &InboundMessage,
    accept_client_open: bool,
) -> DeviceSnapshot {
    let open = if accept_client_open {
        message.open
    } else {
        if let Some(open) = message.open {
            debug!("[Protocol] Ignoring client-supplied {DEVICE_OPEN_KEY}={open}");
        }
        None
    };

    state.apply_partial_update(StateUpdate {
        open,
        armed: message.armed,
        enabled: message.enabled,
    })
}

pub fn encode_notify(open: TriState) -> String {
    OutboundMessage::Notify { open }.to_json()
}

pub fn encode_reply(armed: TriState, enabled: TriState) -> String {
    OutboundMessage::Reply { armed, enabled }.to_json()
}
