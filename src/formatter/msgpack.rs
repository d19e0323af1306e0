//! Binary formatter backed by `rmp-serde` (MessagePack).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::formatter::{Formatter, FormatterError};
use crate::message::{Id, Message, ProtocolMode};

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// `Option<T>`'s derived `Deserialize` treats an explicit null the same as a
/// missing key, which would make `result` indistinguishable from an absent
/// `result` field. This deserializes the key's value (including an explicit
/// null) into `Some`, leaving `#[serde(default)]` to supply `None` only when
/// the key is missing entirely.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize)]
struct Wire {
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Id>,
}

/// Binary formatter. No `jsonrpc` text field to validate, so it always
/// operates in the 2.0 shape (notifications carry no id). Rejects a
/// text-encoding override — see [`crate::formatter::CanHandleTextEncoding`],
/// which this type deliberately does not implement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackFormatter;

impl MessagePackFormatter {
    pub fn new() -> Self {
        Self
    }

    fn wire_for(message: &Message) -> Wire {
        match message {
            Message::Request { id, method, params } => Wire {
                method: Some(method.clone()),
                params: params.clone(),
                result: None,
                error: None,
                id: Some(id.clone()),
            },
            Message::Notification { method, params } => Wire {
                method: Some(method.clone()),
                params: params.clone(),
                result: None,
                error: None,
                id: None,
            },
            Message::Result { id, result } => Wire {
                method: None,
                params: None,
                result: Some(result.clone()),
                error: None,
                id: Some(id.clone()),
            },
            Message::Error {
                id,
                code,
                message,
                data,
            } => Wire {
                method: None,
                params: None,
                result: None,
                error: Some(WireError {
                    code: *code,
                    message: message.clone(),
                    data: data.clone(),
                }),
                id: Some(id.clone()),
            },
        }
    }

    fn classify(wire: Wire) -> Result<Message, FormatterError> {
        if let Some(method) = wire.method {
            return Ok(match wire.id {
                Some(id) => Message::request(id, method, wire.params),
                None => Message::notification(method, wire.params),
            });
        }
        if let Some(err) = wire.error {
            let id = wire.id.unwrap_or(Id::Null);
            return Ok(Message::error(id, err.code, err.message, err.data));
        }
        if wire.result.is_some() {
            let id = wire
                .id
                .ok_or_else(|| FormatterError::Malformed("response missing id".to_string()))?;
            return Ok(Message::result(id, wire.result.unwrap_or(Value::Null)));
        }
        Err(FormatterError::Malformed(
            "message has none of method, result, or error".to_string(),
        ))
    }
}

impl Formatter for MessagePackFormatter {
    fn decode(&self, bytes: &[u8]) -> Result<Message, FormatterError> {
        let wire: Wire =
            rmp_serde::from_slice(bytes).map_err(|e| FormatterError::Malformed(e.to_string()))?;
        Self::classify(wire)
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, FormatterError> {
        rmp_serde::to_vec(&Self::wire_for(message)).map_err(|e| FormatterError::Malformed(e.to_string()))
    }

    fn protocol_mode(&self) -> ProtocolMode {
        ProtocolMode::V2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_request() {
        let fmt = MessagePackFormatter::new();
        let msg = Message::request(Id::string("r-1"), "echo", Some(json!({"n": 1})));
        let bytes = fmt.encode(&msg).unwrap();
        assert_eq!(fmt.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trips_a_notification_with_no_id() {
        let fmt = MessagePackFormatter::new();
        let msg = Message::notification("ping", None);
        let bytes = fmt.encode(&msg).unwrap();
        assert_eq!(fmt.decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trips_an_error_response() {
        let fmt = MessagePackFormatter::new();
        let msg = Message::error(Id::number(4), -32601, "Method not found", None);
        let bytes = fmt.encode(&msg).unwrap();
        assert_eq!(fmt.decode(&bytes).unwrap(), msg);
    }
}
