//! Wire message types for the JSON-RPC 2.0 duplex protocol.
//!
//! Messages come in three flavors — request, response (result or error), and
//! notification — unified here as [`Message`] for transport and dispatch.
//! [`Id`] normalizes the wire's string/number/null id space into one type.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request/response correlation identifier.
///
/// The wire allows a string or a number; `Null` covers notifications encoded
/// in 1.0 mode and the id slot of parse-error responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
    Null,
}

impl Id {
    pub fn number(id: u64) -> Self {
        Id::Number(id)
    }

    pub fn string(id: impl Into<String>) -> Self {
        Id::String(id.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Id::Null)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::String(s) => write!(f, "{s}"),
            Id::Null => write!(f, "null"),
        }
    }
}

/// Protocol compliance mode a [`crate::formatter::Formatter`] enforces on decode
/// and stamps on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// JSON-RPC 2.0: `jsonrpc: "2.0"` required, notifications omit `id`.
    V2,
    /// JSON-RPC 1.0 compatibility: no `jsonrpc` field, every message carries
    /// an `id` (null for notifications), only positional params.
    V1,
}

/// A single JSON-RPC request, response, or notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Option<Value>,
    },
    /// A notification is a request-shaped message with no id and no expected
    /// reply.
    Notification { method: String, params: Option<Value> },
    Result { id: Id, result: Value },
    Error {
        id: Id,
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl Message {
    pub fn request(id: Id, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn result(id: Id, result: Value) -> Self {
        Message::Result { id, result }
    }

    pub fn error(id: Id, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Message::Error {
            id,
            code,
            message: message.into(),
            data,
        }
    }

    /// The correlation id carried by this message, if any (notifications have
    /// none).
    pub fn id(&self) -> Option<&Id> {
        match self {
            Message::Request { id, .. } => Some(id),
            Message::Notification { .. } => None,
            Message::Result { id, .. } => Some(id),
            Message::Error { id, .. } => Some(id),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request { method, .. } => Some(method),
            Message::Notification { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Notification { .. })
    }
}

/// Caller-supplied arguments for an outbound call, or a target's coerced view
/// of an inbound one.
///
/// Positional and named are mutually exclusive on the wire; 1.0 mode
/// forbids named entirely. A formatter that decodes missing or explicit-null
/// `params` produces [`Arguments::None`], which is legal and matches a target
/// overload with no required parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Arguments {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
    #[default]
    None,
}

impl Arguments {
    /// Shape this collection of arguments presents for overload resolution.
    pub fn shape(&self) -> ArgShape {
        match self {
            Arguments::Positional(items) => ArgShape::Positional(items.len()),
            Arguments::Named(map) => ArgShape::Named(map.keys().cloned().collect()),
            Arguments::None => ArgShape::Empty,
        }
    }

    /// Convert to the formatter-neutral `params` value: an array, an object,
    /// or absent.
    pub fn into_params(self) -> Option<Value> {
        match self {
            Arguments::Positional(items) => Some(Value::Array(items)),
            Arguments::Named(map) => Some(Value::Object(map)),
            Arguments::None => None,
        }
    }

    /// Build from a decoded wire `params` value. Missing or null is `None`.
    pub fn from_params(params: Option<Value>) -> Self {
        match params {
            None | Some(Value::Null) => Arguments::None,
            Some(Value::Array(items)) => Arguments::Positional(items),
            Some(Value::Object(map)) => Arguments::Named(map),
            Some(other) => Arguments::Positional(vec![other]),
        }
    }
}

/// The shape of an [`Arguments`] value, used by the dispatcher's overload
/// resolution (arity first, then coercibility).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgShape {
    Positional(usize),
    Named(Vec<String>),
    Empty,
}

/// The reserved notification method used to request cancellation of an
/// in-flight inbound call on the peer.
pub const CANCEL_METHOD: &str = "$/cancelRequest";

/// Parameters carried by a [`CANCEL_METHOD`] notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    pub id: Id,
}
