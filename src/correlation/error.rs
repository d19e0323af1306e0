//! Error types for the outstanding-request table.

use chrono::TimeDelta;
use thiserror::Error;

use crate::message::Id;

/// Correlation error types — each pending outbound call either completes
/// normally or is resolved into exactly one of these.
#[derive(Debug, Clone, Error)]
pub enum CorrelationError {
    /// Request timed out waiting for response.
    #[error("request {id} timed out after {duration}")]
    Timeout { id: Id, duration: TimeDelta },

    /// No pending request with this id (already completed, or never issued).
    #[error("request {id} not found (may have completed or been cancelled)")]
    RequestNotFound { id: Id },

    /// Attempt to correlate a response for an already-completed request; the
    /// duplicate completion is ignored, this is surfaced for diagnostics only.
    #[error("request {id} has already been completed")]
    AlreadyCompleted { id: Id },

    /// The caller's awaitable was dropped before a response arrived.
    #[error("channel error for request {id}: {details}")]
    ChannelClosed { id: Id, details: String },

    #[error("internal correlation error: {message}")]
    Internal { message: String },

    /// Request was explicitly cancelled by the caller.
    #[error("request {id} was cancelled")]
    Cancelled { id: Id },

    /// The session disconnected with every outstanding request still
    /// pending; every entry must be completed or faulted, never leaked.
    #[error("remote disconnected ({reason}) while request {id} was pending")]
    RemoteDisconnected { id: Id, reason: String },

    #[error("remote returned error {code} for request {id}: {message}")]
    RemoteError {
        id: Id,
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },
}

pub type CorrelationResult<T> = std::result::Result<T, CorrelationError>;
