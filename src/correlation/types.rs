//! Type definitions for the outstanding-request table.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

pub use crate::correlation::error::CorrelationResult;

/// An outbound request this session has sent and is waiting on a response
/// for.
///
/// An outstanding-request-entry: a completion sink, the
/// method name (for diagnostics/interceptors), and the original dispatch-time
/// arguments. The per-entry cancellation source lives on [`crate::session::Session`]
/// instead (it must be reachable from the caller's `CancelHandle`, not just
/// the table), so this struct tracks only the `cancel_notified` flag needed
/// to make repeated cancellation a no-op.
#[derive(Debug)]
pub struct PendingRequest {
    pub sender: oneshot::Sender<CorrelationResult<Value>>,
    pub created_at: DateTime<Utc>,
    pub timeout: TimeDelta,
    pub method: String,
    pub request_data: Value,
}

impl PendingRequest {
    pub fn new(
        sender: oneshot::Sender<CorrelationResult<Value>>,
        timeout: TimeDelta,
        method: impl Into<String>,
        request_data: Value,
    ) -> Self {
        Self {
            sender,
            created_at: Utc::now(),
            timeout,
            method: method.into(),
            request_data,
        }
    }

    pub fn is_expired_at(&self, now: &DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_request_is_not_expired_immediately() {
        let (sender, _receiver) = oneshot::channel();
        let pending = PendingRequest::new(
            sender,
            TimeDelta::seconds(30),
            "test",
            serde_json::json!({"method": "test"}),
        );
        assert!(!pending.is_expired_at(&Utc::now()));
    }

    #[test]
    fn pending_request_expires_after_its_timeout() {
        let (sender, _receiver) = oneshot::channel();
        let pending = PendingRequest::new(sender, TimeDelta::milliseconds(1), "test", Value::Null);
        let later = pending.created_at + TimeDelta::milliseconds(10);
        assert!(pending.is_expired_at(&later));
    }
}
