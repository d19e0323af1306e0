//! JSON text formatter backed by `serde_json`.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::formatter::{CanDecodeAsync, CanHandleTextEncoding, Formatter, FormatterError};
use crate::message::{Id, Message, ProtocolMode};

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// `Option<T>`'s derived `Deserialize` treats a JSON `null` the same as a
/// missing key, which would make `result` indistinguishable from an absent
/// `result` field. This deserializes the key's value (including an explicit
/// `null`) into `Some`, leaving `#[serde(default)]` to supply `None` only
/// when the key is missing entirely.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize)]
struct Wire {
    #[serde(skip_serializing_if = "Option::is_none")]
    jsonrpc: Option<String>,
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

/// Text formatter producing/consuming standard JSON-RPC wire bytes.
///
/// Defaults to UTF-8. Implements [`CanHandleTextEncoding`] and
/// [`CanDecodeAsync`], the two optional capabilities a formatter may offer
/// per the message-handler layer.
#[derive(Debug, Clone, Copy)]
pub struct JsonFormatter {
    mode: ProtocolMode,
}

impl JsonFormatter {
    pub fn new(mode: ProtocolMode) -> Self {
        Self { mode }
    }

    fn classify(&self, wire: Wire) -> Result<Message, FormatterError> {
        match self.mode {
            ProtocolMode::V2 => {
                if wire.jsonrpc.as_deref() != Some("2.0") {
                    return Err(FormatterError::ModeViolation {
                        mode: ProtocolMode::V2,
                        reason: "missing or non-\"2.0\" jsonrpc field".into(),
                    });
                }
            }
            ProtocolMode::V1 => {
                if wire.jsonrpc.is_some() {
                    return Err(FormatterError::ModeViolation {
                        mode: ProtocolMode::V1,
                        reason: "jsonrpc field is not allowed in 1.0 mode".into(),
                    });
                }
            }
        }

        if let Some(method) = wire.method {
            let is_notification = match self.mode {
                ProtocolMode::V2 => wire.id.is_none(),
                ProtocolMode::V1 => matches!(wire.id, None | Some(Id::Null)),
            };
            return Ok(if is_notification {
                Message::notification(method, wire.params)
            } else {
                let id = wire.id.ok_or_else(|| {
                    FormatterError::Malformed("request missing id".to_string())
                })?;
                Message::request(id, method, wire.params)
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

    fn wire_for(&self, message: &Message) -> Wire {
        let jsonrpc = matches!(self.mode, ProtocolMode::V2).then(|| "2.0".to_string());
        match message {
            Message::Request { id, method, params } => Wire {
                jsonrpc,
                method: Some(method.clone()),
                params: params.clone(),
                result: None,
                error: None,
                id: Some(id.clone()),
            },
            Message::Notification { method, params } => Wire {
                jsonrpc,
                method: Some(method.clone()),
                params: params.clone(),
                result: None,
                error: None,
                id: match self.mode {
                    ProtocolMode::V2 => None,
                    ProtocolMode::V1 => Some(Id::Null),
                },
            },
            Message::Result { id, result } => Wire {
                jsonrpc,
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
                jsonrpc,
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
}

impl Formatter for JsonFormatter {
    fn decode(&self, bytes: &[u8]) -> Result<Message, FormatterError> {
        let wire: Wire = serde_json::from_slice(bytes)
            .map_err(|e| FormatterError::Malformed(e.to_string()))?;
        self.classify(wire)
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, FormatterError> {
        serde_json::to_vec(&self.wire_for(message)).map_err(|e| FormatterError::Malformed(e.to_string()))
    }

    fn protocol_mode(&self) -> ProtocolMode {
        self.mode
    }

    fn as_decode_async(&self) -> Option<&dyn CanDecodeAsync> {
        Some(self)
    }

    fn as_text_encoding(&self) -> Option<&dyn CanHandleTextEncoding> {
        Some(self)
    }
}

impl CanHandleTextEncoding for JsonFormatter {
    fn decode_with_encoding(&self, bytes: &[u8], encoding: &str) -> Result<Message, FormatterError> {
        if !encoding.eq_ignore_ascii_case("utf-8") {
            return Err(FormatterError::UnsupportedEncoding);
        }
        self.decode(bytes)
    }
}

#[async_trait]
impl CanDecodeAsync for JsonFormatter {
    async fn decode_async(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        len: usize,
    ) -> Result<Message, FormatterError> {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        self.decode(&buf)
    }
}
