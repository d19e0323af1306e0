//! Errors arising from the underlying byte transport.

use thiserror::Error;

/// Errors surfaced by the duplex byte channel a [`crate::framing`] handler
/// reads from and writes to.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport connection is closed")]
    Closed,

    #[error("message too large: {size} bytes (max: {max_size} bytes)")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("incomplete message: connection ended mid-frame")]
    IncompleteMessage,
}
