//! Pluggable value/bytes codec boundary between framed bytes and [`Message`].
//!
//! A [`Formatter`] decodes a complete frame's payload into a [`Message`] and
//! encodes a [`Message`] back into bytes. Two optional capabilities extend the
//! base contract: [`CanDecodeAsync`] lets a formatter stream-decode a large
//! payload instead of requiring it fully buffered, and [`CanHandleTextEncoding`]
//! lets a text formatter honor a framing-supplied character encoding override.

mod json;
mod msgpack;

pub use json::JsonFormatter;
pub use msgpack::MessagePackFormatter;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::message::{Message, ProtocolMode};

#[derive(Debug, Error)]
pub enum FormatterError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message violates protocol mode {mode:?}: {reason}")]
    ModeViolation { mode: ProtocolMode, reason: String },

    #[error("formatter does not support an explicit text encoding")]
    UnsupportedEncoding,

    #[error("I/O error while streaming decode: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec for a single message value.
///
/// The two optional capabilities ([`CanDecodeAsync`], [`CanHandleTextEncoding`])
/// are discovered dynamically through `as_decode_async`/`as_text_encoding`
/// rather than downcasting a `dyn Formatter`, so a framing handler holding a
/// `Arc<dyn Formatter>` can still reach them without generics.
pub trait Formatter: Send + Sync {
    /// Decode one frame's payload into a [`Message`].
    fn decode(&self, bytes: &[u8]) -> Result<Message, FormatterError>;

    /// Encode a [`Message`] to bytes ready to be framed and written.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, FormatterError>;

    /// The protocol compliance mode this formatter enforces.
    fn protocol_mode(&self) -> ProtocolMode;

    /// `Some(self)` if this formatter implements [`CanDecodeAsync`].
    fn as_decode_async(&self) -> Option<&dyn CanDecodeAsync> {
        None
    }

    /// `Some(self)` if this formatter implements [`CanHandleTextEncoding`].
    fn as_text_encoding(&self) -> Option<&dyn CanHandleTextEncoding> {
        None
    }
}

/// Capability marker: this formatter can decode directly from an async byte
/// stream of known length, avoiding buffering the whole payload up front.
#[async_trait]
pub trait CanDecodeAsync: Formatter {
    async fn decode_async(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        len: usize,
    ) -> Result<Message, FormatterError>;
}

/// Capability marker: this formatter is text-based and can be told to decode
/// a frame using an encoding other than its default (UTF-8).
pub trait CanHandleTextEncoding: Formatter {
    fn decode_with_encoding(&self, bytes: &[u8], encoding: &str) -> Result<Message, FormatterError>;
}
