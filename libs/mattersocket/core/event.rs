use crate::config::DataFormat;
use crate::error::{MatterSocketError, Result};
use crate::transport::WsMessage;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;

/// Event tag of the server greeting
pub const HELLO_EVENT: &str = "hello";

/// Decoded content of one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

/// The unit delivered to the caller's handler
///
/// Built per inbound frame; `seq` and `event` are lifted out of the payload
/// when the frame is a JSON object carrying them.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    payload: Payload,
    seq: Option<i64>,
    event: Option<String>,
}

/// Data of the `hello` event sent after a successful authentication
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Hello {
    pub connection_id: String,
    pub server_version: String,
}

impl EventEnvelope {
    pub fn from_json(value: Value) -> Self {
        let seq = value.get("seq").and_then(Value::as_i64);
        let event = value
            .get("event")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            payload: Payload::Json(value),
            seq,
            event,
        }
    }

    /// Wrap raw text, still lifting `seq`/`event` when the text is a JSON object
    pub fn from_text(text: String) -> Self {
        let (seq, event) = match serde_json::from_str::<Value>(&text) {
            Ok(value) => (
                value.get("seq").and_then(Value::as_i64),
                value
                    .get("event")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            Err(_) => (None, None),
        };
        Self {
            payload: Payload::Text(text),
            seq,
            event,
        }
    }

    /// Decode a frame according to the configured format
    ///
    /// # Returns
    /// * `Ok(Some(envelope))` - A data frame was decoded
    /// * `Ok(None)` - Control frame, nothing to deliver
    /// * `Err(MatterSocketError::Decode)` - The frame is malformed for this format
    pub fn decode(message: WsMessage, format: DataFormat) -> Result<Option<Self>> {
        let envelope = match (message, format) {
            (WsMessage::Ping(_) | WsMessage::Pong(_), _) => return Ok(None),
            (WsMessage::Text(text), DataFormat::Json) => Self::from_json(serde_json::from_str(&text)?),
            (WsMessage::Binary(data), DataFormat::Json) => {
                Self::from_json(serde_json::from_slice(&data)?)
            }
            (WsMessage::Text(text), DataFormat::Text) => Self::from_text(text),
            (WsMessage::Binary(data), DataFormat::Text) => {
                let text = String::from_utf8(data).map_err(|e| {
                    MatterSocketError::Decode(format!("binary frame is not UTF-8: {e}"))
                })?;
                Self::from_text(text)
            }
        };
        Ok(Some(envelope))
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn seq(&self) -> Option<i64> {
        self.seq
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn is_event(&self, name: &str) -> bool {
        self.event() == Some(name)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// The payload as JSON, parsing raw text on demand
    pub fn structured(&self) -> Result<Cow<'_, Value>> {
        match &self.payload {
            Payload::Json(value) => Ok(Cow::Borrowed(value)),
            Payload::Text(text) => Ok(Cow::Owned(serde_json::from_str(text)?)),
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.as_json()?.get("status")?.as_str()
    }

    pub fn seq_reply(&self) -> Option<i64> {
        self.as_json()?.get("seq_reply")?.as_i64()
    }

    pub fn data(&self) -> Option<&Value> {
        self.as_json()?.get("data")
    }

    /// Typed view of a `hello` event
    pub fn hello(&self) -> Option<Hello> {
        if !self.is_event(HELLO_EVENT) {
            return None;
        }
        let data = self.structured().ok()?.get("data")?.clone();
        serde_json::from_value(data).ok()
    }
}
