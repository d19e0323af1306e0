//! The session engine: owns the read loop, the single-producer write path,
//! the outstanding-request table, and the connection's finite-state
//! lifecycle.
//!
//! `invoke` follows a register-then-send-then-await shape, as plain `&self`
//! async methods over an `Arc`-shared inner state rather than wrapping the
//! whole session in `Arc` at the call site. Disconnection uses a
//! `broadcast`-based shutdown signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::correlation::{CorrelationConfig, CorrelationError, CorrelationManager};
use crate::dispatcher::{Dispatcher, DispatcherConfig, NameTransform, Target, TargetOptions};
use crate::error::{RpcErrorCode, SessionError};
use crate::framing::{MessageHandler, ReadOutcome};
use crate::message::{Arguments, CancelParams, Id, Message, CANCEL_METHOD};

/// Where a session sits in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// Constructed but `start_listening` has not run yet.
    Created,
    /// Read loop is running; `invoke`/`notify` are accepted.
    Listening,
    /// Shutting down: no new outbound calls, writes are draining, inbound
    /// targets are being cancelled.
    Disconnecting,
    /// Terminal. No further activity.
    Disconnected,
}

/// Why a session disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `Session::dispose` was called locally.
    LocallyDisposed,
    /// The peer closed the transport cleanly.
    RemoteEndClosed,
    /// An inbound frame left the byte stream desynchronized.
    ParseError,
    /// A read or write I/O error occurred.
    StreamError,
    /// An unexpected internal failure.
    FatalException,
}

/// Fired exactly once, the single authoritative signal that no further calls
/// on this session will succeed.
#[derive(Debug, Clone)]
pub struct DisconnectedEvent {
    pub description: String,
    pub reason: DisconnectReason,
}

struct SessionInner {
    handler: Arc<dyn MessageHandler>,
    dispatcher: Dispatcher,
    correlation: CorrelationManager,
    state: RwLock<SessionLifecycle>,
    next_id: AtomicU64,
    disconnecting: AtomicBool,
    session_cancel: CancelHandle,
    session_token: CancelToken,
    disconnect_tx: broadcast::Sender<DisconnectedEvent>,
    read_loop: RwLock<Option<JoinHandle<()>>>,
}

/// A single bidirectional JSON-RPC connection.
///
/// Cheaply cloneable: clones share the same underlying read loop, write
/// path, and tables. Typically constructed once per connection and held
/// behind whatever ownership the embedding application prefers.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Builds a session over `handler` with default dispatcher and
    /// correlation configuration and the identity method-name transform.
    pub fn new(handler: impl MessageHandler + 'static) -> Self {
        Self::with_config(
            handler,
            DispatcherConfig::default(),
            crate::dispatcher::identity_transform(),
            CorrelationConfig::default(),
        )
    }

    pub fn with_config(
        handler: impl MessageHandler + 'static,
        dispatcher_config: DispatcherConfig,
        name_transform: NameTransform,
        correlation_config: CorrelationConfig,
    ) -> Self {
        let (session_cancel, session_token) = cancel_pair();
        let (disconnect_tx, _) = broadcast::channel(16);

        let inner = Arc::new(SessionInner {
            handler: Arc::new(handler),
            dispatcher: Dispatcher::new(dispatcher_config, name_transform),
            correlation: CorrelationManager::new(correlation_config),
            state: RwLock::new(SessionLifecycle::Created),
            next_id: AtomicU64::new(1),
            disconnecting: AtomicBool::new(false),
            session_cancel,
            session_token,
            disconnect_tx,
            read_loop: RwLock::new(None),
        });

        Session { inner }
    }

    /// Registers a local method implementation.
    pub fn add_local_target(
        &self,
        name: impl AsRef<str>,
        target: impl Target + 'static,
        options: TargetOptions,
    ) {
        self.inner.dispatcher.add_target(name, target, options);
    }

    pub async fn state(&self) -> SessionLifecycle {
        *self.inner.state.read().await
    }

    /// Starts the background read loop. Idempotent once listening; fails
    /// only if the session has already started disconnecting or disposing.
    pub async fn start_listening(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.state.write().await;
            match *state {
                SessionLifecycle::Created => *state = SessionLifecycle::Listening,
                SessionLifecycle::Listening => return Ok(()),
                SessionLifecycle::Disconnecting | SessionLifecycle::Disconnected => {
                    return Err(SessionError::Disposed)
                }
            }
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { Session::run_read_loop(inner).await });
        *self.inner.read_loop.write().await = Some(handle);
        debug!("session listening");
        Ok(())
    }

    /// Sends a request and awaits its correlated response. Not cancellable;
    /// see [`Session::invoke_cancellable`].
    pub async fn invoke(
        &self,
        method: impl Into<String>,
        args: Arguments,
    ) -> Result<Value, SessionError> {
        let (_handle, future) = self.invoke_cancellable(method, args);
        future.await
    }

    /// Sends a request, returning a handle that cancels it and a future that
    /// resolves once the peer's response (success, error, or cancellation
    /// acknowledgement) arrives.
    pub fn invoke_cancellable(
        &self,
        method: impl Into<String>,
        args: Arguments,
    ) -> (
        CancelHandle,
        impl std::future::Future<Output = Result<Value, SessionError>>,
    ) {
        let method = method.into();
        let (cancel_source, cancel_token) = cancel_pair();
        let inner = Arc::clone(&self.inner);
        let future = async move { Session::invoke_inner(inner, method, args, cancel_token).await };
        (cancel_source, future)
    }

    async fn invoke_inner(
        inner: Arc<SessionInner>,
        method: String,
        args: Arguments,
        cancel_token: CancelToken,
    ) -> Result<Value, SessionError> {
        match *inner.state.read().await {
            SessionLifecycle::Created => return Err(SessionError::NotYetListening),
            SessionLifecycle::Listening => {}
            SessionLifecycle::Disconnecting | SessionLifecycle::Disconnected => {
                return Err(SessionError::ConnectionLost("session is not listening".into()))
            }
        }

        let id = Id::Number(inner.next_id.fetch_add(1, Ordering::SeqCst));
        let params = args.into_params();
        let receiver = inner
            .correlation
            .register(id.clone(), method.clone(), None, params.clone().unwrap_or(Value::Null))?;

        let watcher = {
            let watch_inner = Arc::clone(&inner);
            let watch_id = id.clone();
            tokio::spawn(async move {
                cancel_token.cancelled().await;
                let cancel_params = serde_json::json!({ "id": watch_id });
                if let Err(err) =
                    Session::write_notification(&watch_inner, CANCEL_METHOD, Some(cancel_params))
                        .await
                {
                    warn!(error = %err, "failed to write cancellation notification");
                }
            })
        };

        let request = Message::request(id.clone(), method, params);
        if let Err(write_err) = inner.handler.write_async(&request, inner.session_token.clone()).await {
            watcher.abort();
            inner.correlation.complete(
                &id,
                Err(CorrelationError::ChannelClosed {
                    id: id.clone(),
                    details: write_err.to_string(),
                }),
            );
            let description = write_err.to_string();
            Session::initiate_disconnect(&inner, DisconnectReason::StreamError, description).await;
            return Err(SessionError::ConnectionLost(write_err.to_string()));
        }

        let outcome = receiver.await;
        watcher.abort();

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CorrelationError::RemoteError { code, message, data, .. })) => {
                if code == inner.dispatcher.cancellation_error_code() {
                    Err(SessionError::Cancelled)
                } else {
                    Err(SessionError::Remote { code, message, data })
                }
            }
            Ok(Err(CorrelationError::Timeout { id, duration })) => Err(SessionError::ConnectionLost(
                format!("request {id} timed out after {duration}"),
            )),
            Ok(Err(CorrelationError::RemoteDisconnected { reason, .. })) => {
                Err(SessionError::ConnectionLost(reason))
            }
            Ok(Err(other)) => Err(SessionError::Correlation(other)),
            Err(_recv_dropped) => {
                Err(SessionError::ConnectionLost("correlation channel closed".into()))
            }
        }
    }

    /// Sends a one-way notification; no response is expected and no
    /// outstanding-request entry is created.
    pub async fn notify(
        &self,
        method: impl Into<String>,
        args: Arguments,
    ) -> Result<(), SessionError> {
        Session::write_notification(&self.inner, method.into(), args.into_params()).await
    }

    async fn write_notification(
        inner: &Arc<SessionInner>,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<(), SessionError> {
        let message = Message::notification(method, params);
        inner
            .handler
            .write_async(&message, inner.session_token.clone())
            .await
            .map_err(SessionError::from)
    }

    /// Subscribes to the single authoritative disconnect signal.
    pub fn on_disconnected(&self) -> broadcast::Receiver<DisconnectedEvent> {
        self.inner.disconnect_tx.subscribe()
    }

    /// Disposes the session: cancels the read loop, drains writes, faults
    /// every pending invocation with `ConnectionLost`, and releases the
    /// underlying transport.
    pub async fn dispose(self) {
        Session::initiate_disconnect(
            &self.inner,
            DisconnectReason::LocallyDisposed,
            "session disposed locally".into(),
        )
        .await;

        if let Some(handle) = self.inner.read_loop.write().await.take() {
            let _ = handle.await;
        }
    }

    async fn initiate_disconnect(inner: &Arc<SessionInner>, reason: DisconnectReason, description: String) {
        if inner.disconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        *inner.state.write().await = SessionLifecycle::Disconnecting;
        inner.session_cancel.cancel();
        inner.correlation.stop_cleanup();
        inner.correlation.cancel_all(description.clone());
        inner.handler.dispose().await;
        *inner.state.write().await = SessionLifecycle::Disconnected;

        warn!(?reason, %description, "session disconnected");
        let _ = inner.disconnect_tx.send(DisconnectedEvent { description, reason });
    }

    async fn run_read_loop(inner: Arc<SessionInner>) {
        loop {
            let outcome = inner.handler.read_async(inner.session_token.clone()).await;

            let message = match outcome {
                Ok(ReadOutcome::Eof) => {
                    Session::initiate_disconnect(
                        &inner,
                        DisconnectReason::RemoteEndClosed,
                        "remote closed the connection".into(),
                    )
                    .await;
                    break;
                }
                Ok(ReadOutcome::DecodeError(err)) => {
                    warn!(error = %err, "rejecting malformed frame");
                    let reply = Message::error(Id::Null, RpcErrorCode::PARSE_ERROR, err.to_string(), None);
                    if let Err(write_err) =
                        inner.handler.write_async(&reply, inner.session_token.clone()).await
                    {
                        Session::initiate_disconnect(
                            &inner,
                            DisconnectReason::StreamError,
                            write_err.to_string(),
                        )
                        .await;
                        break;
                    }
                    continue;
                }
                Ok(ReadOutcome::Message(message)) => message,
                Err(crate::framing::FramingError::Cancelled) => break,
                Err(framing_err) => {
                    warn!(error = %framing_err, "framing desynchronized, disconnecting");
                    Session::initiate_disconnect(&inner, DisconnectReason::ParseError, framing_err.to_string())
                        .await;
                    break;
                }
            };

            if let Message::Notification { method, params } = &message {
                if method == CANCEL_METHOD {
                    if let Some(cancel_id) = params
                        .as_ref()
                        .and_then(|p| serde_json::from_value::<CancelParams>(p.clone()).ok())
                        .map(|p| p.id)
                    {
                        inner.dispatcher.cancel_inbound(&cancel_id);
                    }
                    continue;
                }
            }

            match message {
                Message::Request { .. } | Message::Notification { .. } => {
                    let permit = inner.dispatcher.acquire_permit().await;
                    let task_inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        let _permit = permit;
                        let token = task_inner.session_token.clone();
                        if let Some(reply) = task_inner.dispatcher.dispatch(message, token).await {
                            if let Err(err) = task_inner
                                .handler
                                .write_async(&reply, task_inner.session_token.clone())
                                .await
                            {
                                warn!(error = %err, "failed to write dispatch response");
                            }
                        }
                    });
                }
                Message::Result { id, result } => {
                    inner.correlation.complete(&id, Ok(result));
                }
                Message::Error { id, code, message, data } => {
                    trace!(%id, code, "correlating error response");
                    inner.correlation.complete(
                        &id,
                        Err(CorrelationError::RemoteError { id: id.clone(), code, message, data }),
                    );
                }
            }
        }

        debug!("read loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::dispatcher::{Arity, TargetError};
    use crate::formatter::JsonFormatter;
    use crate::framing::LengthPrefixedHandler;
    use crate::message::ProtocolMode;

    struct Echo;

    #[async_trait]
    impl Target for Echo {
        async fn call(&self, args: Arguments, _cancel: CancelToken) -> Result<Value, TargetError> {
            match args {
                Arguments::Positional(mut items) if items.len() == 1 => Ok(items.remove(0)),
                _ => Err(TargetError::InvalidParams("expected one arg".into())),
            }
        }

        fn arity(&self) -> Arity {
            Arity::Positional(1)
        }
    }

    fn paired_sessions() -> (Session, Session) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let formatter = || Arc::new(JsonFormatter::new(ProtocolMode::V2));
        let left = Session::new(LengthPrefixedHandler::new(a, formatter(), Default::default()));
        let right = Session::new(LengthPrefixedHandler::new(b, formatter(), Default::default()));
        (left, right)
    }

    #[tokio::test]
    async fn echo_round_trip_over_length_prefixed_framing() {
        let (client, server) = paired_sessions();
        server.add_local_target("echo", Echo, TargetOptions::default());

        client.start_listening().await.unwrap();
        server.start_listening().await.unwrap();

        let result = client
            .invoke("echo", Arguments::Positional(vec![serde_json::json!("hi")]))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn unknown_method_surfaces_as_a_remote_error() {
        let (client, server) = paired_sessions();

        client.start_listening().await.unwrap();
        server.start_listening().await.unwrap();

        let err = client.invoke("nope", Arguments::None).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Remote { code, .. } if code == RpcErrorCode::METHOD_NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn invoke_before_listening_fails_fast() {
        let (client, _server) = paired_sessions();
        let err = client.invoke("echo", Arguments::None).await.unwrap_err();
        assert!(matches!(err, SessionError::NotYetListening));
    }

    #[tokio::test]
    async fn disconnect_fires_exactly_once_and_faults_pending_invokes() {
        let (client, server) = paired_sessions();
        client.start_listening().await.unwrap();
        server.start_listening().await.unwrap();

        let mut events = client.on_disconnected();
        server.dispose().await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("disconnect event should fire")
            .unwrap();
        assert_eq!(event.reason, DisconnectReason::RemoteEndClosed);
    }
}
