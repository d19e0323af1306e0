//! Framed reading and writing of discrete [`Message`]s over a duplex byte
//! transport.
//!
//! A [`MessageHandler`] turns "some bytes" into "one message" and back, using
//! a pluggable [`crate::formatter::Formatter`] for the value<->bytes boundary.
//! Two concrete framings ship here: [`length_prefixed`] (4-byte big-endian
//! length prefix) and [`header_delimited`] (HTTP-like `Content-Length`
//! headers, as used by LSP-family JSON-RPC peers). Both read and write their
//! prefix directly off the live transport halves so a large payload can be
//! handed to the formatter as a bounded live sub-stream instead of being
//! buffered into memory first.

pub mod header_delimited;
pub mod length_prefixed;

pub use header_delimited::HeaderDelimitedHandler;
pub use length_prefixed::LengthPrefixedHandler;

use async_trait::async_trait;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::formatter::FormatterError;
use crate::message::Message;

/// Configuration shared by both framings.
#[derive(Debug, Clone, Copy)]
pub struct FramingConfig {
    /// Frame payloads at or below this size are fully buffered before being
    /// handed to the formatter. Frames above it are handed to the formatter
    /// as a bounded byte stream when the formatter is [`crate::formatter::CanDecodeAsync`].
    pub async_decode_threshold: usize,
    /// Frames larger than this are rejected outright as a desynchronized /
    /// implausible length, independent of `async_decode_threshold`.
    pub max_frame_len: usize,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            async_decode_threshold: 64 * 1024,
            max_frame_len: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum FramingError {
    /// Connection ended with a partially-read frame; framing is
    /// desynchronized. Fatal — the session disconnects with `ParseError`.
    #[error("connection ended mid-frame")]
    UnexpectedEof,

    /// A header-delimited frame's header block was malformed or never found
    /// its `\r\n\r\n` terminator. Fatal for the same reason as above.
    #[error("malformed frame header: {0}")]
    HeaderParse(String),

    /// A declared frame length exceeds `FramingConfig::max_frame_len`. Fatal.
    #[error("frame length {0} exceeds configured maximum")]
    LengthOverflow(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

/// The outcome of one [`MessageHandler::read_async`] call.
///
/// [`ReadOutcome::DecodeError`] is distinguished from `Err(FramingError)`
/// because a formatter rejecting a well-framed payload does *not*
/// desynchronize the byte stream — the session replies with a `ParseError`
/// response and keeps reading. A `FramingError` return means the frame
/// boundaries themselves were lost, which is fatal.
pub enum ReadOutcome {
    Message(Message),
    Eof,
    DecodeError(FormatterError),
}

/// One message in, one message out, over a framed duplex transport.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn can_read(&self) -> bool {
        true
    }

    fn can_write(&self) -> bool {
        true
    }

    /// Reads the next frame. Returns `Ok(ReadOutcome::Eof)` exactly once, on
    /// clean end-of-stream.
    async fn read_async(&self, cancel: CancelToken) -> Result<ReadOutcome, FramingError>;

    /// Writes one message. Concurrent calls are serialized by the handler;
    /// bytes of distinct messages never interleave.
    async fn write_async(&self, message: &Message, cancel: CancelToken) -> Result<(), FramingError>;

    /// Releases the underlying transport. Idempotent.
    async fn dispose(&self);
}
