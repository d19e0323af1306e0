//! The outstanding-request table: correlates incoming responses with the
//! outbound calls this session is waiting on.
//!
//! `DashMap`-backed pending table with a background cleanup task over a
//! `tokio::time::interval` and `oneshot` completion channels, keyed on
//! [`crate::message::Id`]. Ids are allocated by the session's
//! write-serializer, not generated internally, since the wire id must match
//! the id the caller observes before the table is even aware of it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::TimeDelta;
use dashmap::DashMap;
use serde_json::Value;
use tokio::{
    sync::{oneshot, RwLock},
    task::JoinHandle,
    time::{interval, Duration},
};
use tracing::{debug, trace, warn};

use crate::correlation::{
    error::{CorrelationError, CorrelationResult},
    types::PendingRequest,
};
use crate::message::Id;

/// Configuration for the outstanding-request table.
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Default timeout applied to a registered request if none is given.
    pub default_timeout: TimeDelta,
    /// How often the background task scans for expired requests.
    pub cleanup_interval: Duration,
    /// Maximum simultaneously pending requests (0 = unlimited).
    pub max_pending_requests: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            default_timeout: TimeDelta::seconds(30),
            cleanup_interval: Duration::from_secs(5),
            max_pending_requests: 0,
        }
    }
}

/// Tracks every outbound request this session has sent and not yet
/// correlated with a response.
///
/// `register` pairs with exactly one consuming `complete`; a duplicate
/// completion is ignored rather than erroring, since a slow peer racing a
/// session-level timeout is an expected, non-exceptional occurrence.
#[derive(Debug)]
pub struct CorrelationManager {
    requests: Arc<DashMap<Id, PendingRequest>>,
    config: CorrelationConfig,
    cleanup_task: RwLock<Option<JoinHandle<()>>>,
    shutdown_signal: Arc<AtomicBool>,
}

impl CorrelationManager {
    /// Creates a manager and starts its background expiry-cleanup task.
    pub fn new(config: CorrelationConfig) -> Self {
        let requests: Arc<DashMap<Id, PendingRequest>> = Arc::new(DashMap::new());
        let shutdown_signal = Arc::new(AtomicBool::new(false));

        let cleanup_task = Self::spawn_cleanup_task(
            Arc::clone(&requests),
            config.cleanup_interval,
            Arc::clone(&shutdown_signal),
        );

        debug!(?config, "correlation manager initialized");

        Self {
            requests,
            config,
            cleanup_task: RwLock::new(Some(cleanup_task)),
            shutdown_signal,
        }
    }

    /// Same as [`Self::new`] but without a cleanup task, for deterministic
    /// tests and benchmarks.
    #[doc(hidden)]
    pub fn new_without_cleanup(config: CorrelationConfig) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            config,
            cleanup_task: RwLock::new(None),
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a new outbound call under an id the caller has already
    /// allocated. Returns the receiver half of the completion channel.
    pub fn register(
        &self,
        id: Id,
        method: impl Into<String>,
        timeout: Option<TimeDelta>,
        request_data: Value,
    ) -> CorrelationResult<oneshot::Receiver<CorrelationResult<Value>>> {
        if self.config.max_pending_requests > 0
            && self.requests.len() >= self.config.max_pending_requests
        {
            return Err(CorrelationError::Internal {
                message: "maximum pending requests exceeded".to_string(),
            });
        }

        let (sender, receiver) = oneshot::channel();
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let method = method.into();

        trace!(%id, %method, "registering outstanding request");
        let pending = PendingRequest::new(sender, timeout, method, request_data);
        self.requests.insert(id, pending);

        Ok(receiver)
    }

    /// Completes a pending request, delivering `response` to its caller.
    /// Returns `true` if an entry was found and completed, `false` if the
    /// id was unknown (already completed, timed out, or never registered —
    /// an unrecognized response is logged and
    /// dropped rather than treated as an error).
    pub fn complete(&self, id: &Id, response: CorrelationResult<Value>) -> bool {
        match self.requests.remove(id) {
            Some((_, pending)) => {
                trace!(%id, "correlating response");
                if pending.sender.send(response).is_err() {
                    warn!(%id, "completion receiver was dropped before response arrived");
                }
                true
            }
            None => {
                warn!(%id, "response for unknown or already-completed request dropped");
                false
            }
        }
    }

    /// Completes every pending request with a disconnection error. Called
    /// once during session shutdown so no outstanding-request entry is ever
    /// leaked.
    pub fn cancel_all(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let ids: Vec<Id> = self.requests.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.requests.remove(&id) {
                let _ = pending.sender.send(Err(CorrelationError::RemoteDisconnected {
                    id,
                    reason: reason.clone(),
                }));
            }
        }
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.requests.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }

    /// Signals the background cleanup task to stop on its next tick, without
    /// taking ownership of the manager. Used when a session disconnects but
    /// other `Arc` handles to the manager may still be outstanding.
    pub fn stop_cleanup(&self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
    }

    fn spawn_cleanup_task(
        requests: Arc<DashMap<Id, PendingRequest>>,
        cleanup_interval: Duration,
        shutdown_signal: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(cleanup_interval);

            while !shutdown_signal.load(Ordering::Relaxed) {
                ticker.tick().await;

                let now = chrono::Utc::now();
                let expired: Vec<Id> = requests
                    .iter()
                    .filter_map(|entry| entry.value().is_expired_at(&now).then(|| entry.key().clone()))
                    .collect();

                if !expired.is_empty() {
                    debug!(count = expired.len(), "cleaning up expired requests");
                }

                for id in expired {
                    if let Some((_, pending)) = requests.remove(&id) {
                        let _ = pending.sender.send(Err(CorrelationError::Timeout {
                            id: id.clone(),
                            duration: pending.timeout,
                        }));
                        trace!(%id, "request timed out");
                    }
                }
            }

            debug!("correlation cleanup task shutting down");
        })
    }

    /// Stops the background cleanup task and faults every remaining pending
    /// request. Consumes the manager.
    pub async fn shutdown(self) {
        self.shutdown_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.cleanup_task.write().await.take() {
            let _ = handle.await;
        }
        self.cancel_all("session disposed");
        debug!("correlation manager shutdown complete");
    }
}
