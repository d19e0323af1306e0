//! Routes incoming requests and notifications to locally registered
//! [`Target`]s, and bounds inbound concurrency.
//!
//! The method-name -> handler map and `MethodNotFound`/`InternalError`
//! response synthesis follow a plain lookup-and-respond skeleton; the
//! concurrency gate is a `tokio::sync::Semaphore` whose permit is acquired by
//! the caller (the session's read loop) *before* the next frame is read, so
//! an exhausted gate genuinely stalls reading rather than just queuing
//! spawned tasks.

mod target;

pub use target::{Arity, Target, TargetError, TargetOptions};

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace, warn};

use crate::cancel::{cancel_pair, CancelToken};
use crate::error::RpcErrorCode;
use crate::message::{Arguments, Id, Message, CANCEL_METHOD};

/// An injectable method-name transform, applied once at registration.
pub type NameTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Identity transform: registers and resolves names verbatim.
pub fn identity_transform() -> NameTransform {
    Arc::new(|name: &str| name.to_string())
}

/// Converts `snake_case`/`kebab-case` segments to `camelCase`.
pub fn camel_case_transform() -> NameTransform {
    Arc::new(|name: &str| {
        let mut out = String::with_capacity(name.len());
        let mut upper_next = false;
        for ch in name.chars() {
            if ch == '_' || ch == '-' {
                upper_next = true;
            } else if upper_next {
                out.extend(ch.to_uppercase());
                upper_next = false;
            } else {
                out.push(ch);
            }
        }
        out
    })
}

/// Prefixes every registered name with a fixed string (e.g. `"textDocument/"`).
pub fn fixed_prefix_transform(prefix: impl Into<String>) -> NameTransform {
    let prefix = prefix.into();
    Arc::new(move |name: &str| format!("{prefix}{name}"))
}

/// Errors from registering local targets. Per-request failures (unknown
/// method, bad params, target errors) are *not* represented here — they
/// become JSON-RPC error responses, never a Rust error.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("method '{0}' has no matching overload for the given arguments")]
    NoMatchingOverload(String),
}

/// Bounds in-flight inbound requests and configures dispatch behavior.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// `None` = unbounded.
    pub max_concurrent_inbound: Option<usize>,
    /// Log (rather than silently drop) notifications for unregistered
    /// methods.
    pub strict_unhandled_notifications: bool,
    /// The error code written for a cancelled inbound dispatch. Nonstandard
    /// configurable for peers that map cancellation differently.
    pub cancellation_error_code: i32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_inbound: None,
            strict_unhandled_notifications: false,
            cancellation_error_code: RpcErrorCode::REQUEST_CANCELLED_DEFAULT,
        }
    }
}

struct TargetEntry {
    target: Arc<dyn Target>,
    options: TargetOptions,
}

/// The local method map plus the inbound concurrency gate and the
/// cancellable-inbound-requests table.
pub struct Dispatcher {
    targets: DashMap<String, Vec<TargetEntry>>,
    name_transform: NameTransform,
    config: DispatcherConfig,
    gate: Option<Arc<Semaphore>>,
    inbound_cancellations: DashMap<Id, crate::cancel::CancelSource>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, name_transform: NameTransform) -> Self {
        let gate = config.max_concurrent_inbound.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            targets: DashMap::new(),
            name_transform,
            config,
            gate,
            inbound_cancellations: DashMap::new(),
        }
    }

    /// Registers a target under `name` (after the configured name-transform).
    pub fn add_target(&self, name: impl AsRef<str>, target: impl Target + 'static, options: TargetOptions) {
        let name = (self.name_transform)(name.as_ref());
        debug!(method = %name, "registering local target");
        self.targets
            .entry(name)
            .or_default()
            .push(TargetEntry {
                target: Arc::new(target),
                options,
            });
    }

    /// Acquires one slot of the inbound concurrency gate. The session's read
    /// loop awaits this *before* reading the next frame, turning an
    /// exhausted gate into genuine backpressure rather than unbounded
    /// task queuing.
    pub async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.gate {
            None => None,
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .expect("dispatcher semaphore is never closed"),
            ),
        }
    }

    /// The error code this dispatcher writes when a target honors its
    /// cancellation token.
    pub fn cancellation_error_code(&self) -> i32 {
        self.config.cancellation_error_code
    }

    /// Cancels an in-flight inbound dispatch, if one is registered under
    /// `id`. Called by the session's read loop on receipt of a
    /// `$/cancelRequest` notification. A no-op if the id is unknown (the
    /// target may have already completed).
    pub fn cancel_inbound(&self, id: &Id) {
        if let Some((_, source)) = self.inbound_cancellations.remove(id) {
            trace!(%id, "cancelling inbound dispatch");
            source.cancel();
        }
    }

    /// Looks up `method` as it arrived on the wire. The name-transform is
    /// applied once, at registration (`add_target`) — the wire already
    /// carries the transformed name, so resolution must not transform it a
    /// second time (that would break non-idempotent transforms such as
    /// `fixed_prefix_transform`).
    fn resolve<'a>(
        &'a self,
        method: &str,
        shape: &crate::message::ArgShape,
    ) -> Option<dashmap::mapref::one::Ref<'a, String, Vec<TargetEntry>>> {
        self.targets.get(method).filter(|entries| {
            entries
                .iter()
                .any(|entry| entry.target.arity().matches(shape))
        })
    }

    /// Runs the full per-request dispatch flow and returns the response to
    /// write, or `None` for a notification (which never produces a reply
    /// regardless of outcome).
    ///
    /// `session_token` is combined with a fresh per-dispatch cancellation
    /// source so the target's token fires on whichever happens first: an
    /// explicit `$/cancelRequest`, or the whole session shutting down.
    pub async fn dispatch(&self, message: Message, session_token: CancelToken) -> Option<Message> {
        let (id, method, params, is_notification) = match message {
            Message::Request { id, method, params } => (Some(id), method, params, false),
            Message::Notification { method, params } => (None, method, params, true),
            _ => return None,
        };

        if method == CANCEL_METHOD {
            // The session's read loop handles `$/cancelRequest` directly and
            // never routes it here; guard against a misbehaving peer that
            // sends it as a request anyway.
            return id.map(|id| {
                Message::error(
                    id,
                    RpcErrorCode::METHOD_NOT_FOUND,
                    "reserved method",
                    None,
                )
            });
        }

        let args = Arguments::from_params(params);
        let shape = args.shape();

        let entries = match self.resolve(&method, &shape) {
            Some(entries) => entries,
            None => {
                return match id {
                    Some(id) => Some(Message::error(
                        id,
                        RpcErrorCode::METHOD_NOT_FOUND,
                        format!("method not found: {method}"),
                        None,
                    )),
                    None => {
                        if self.config.strict_unhandled_notifications {
                            warn!(%method, "unsolicited notification for unregistered method dropped");
                        }
                        None
                    }
                };
            }
        };

        let entry = entries
            .iter()
            .find(|e| e.target.arity().matches(&shape))
            .expect("resolve() only returns entries with a matching overload");

        if is_notification && !entry.options.allow_notifications {
            trace!(%method, "target does not allow notifications, dropping");
            return None;
        }

        let target = Arc::clone(&entry.target);
        drop(entries);

        let (cancel_source, request_token) = cancel_pair();
        let combined_token = request_token.any(session_token);
        if let Some(id) = &id {
            self.inbound_cancellations.insert(id.clone(), cancel_source);
        }

        let invocation = tokio::spawn(async move { target.call(args, combined_token).await });
        let outcome = invocation.await;

        if let Some(id) = &id {
            self.inbound_cancellations.remove(id);
        }

        let id = match id {
            Some(id) => id,
            None => return None,
        };

        Some(match outcome {
            Ok(Ok(result)) => Message::result(id, result),
            Ok(Err(TargetError::Cancelled)) => Message::error(
                id,
                self.config.cancellation_error_code,
                "request cancelled",
                None,
            ),
            Ok(Err(TargetError::InvalidParams(reason))) => {
                Message::error(id, RpcErrorCode::INVALID_PARAMS, reason, None)
            }
            Ok(Err(TargetError::Domain {
                error_type,
                message,
                data,
            })) => Message::error(
                id,
                RpcErrorCode::INVOCATION_ERROR,
                message,
                Some(data.unwrap_or_else(|| json!({"type": error_type}))),
            ),
            Err(join_err) => {
                warn!(error = %join_err, "target invocation panicked");
                Message::error(
                    id,
                    RpcErrorCode::INTERNAL_ERROR,
                    format!("internal error: {join_err}"),
                    None,
                )
            }
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registered_methods", &self.targets.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Target for Echo {
        async fn call(&self, args: Arguments, _cancel: CancelToken) -> Result<Value, TargetError> {
            match args {
                Arguments::Positional(mut items) if items.len() == 1 => Ok(items.remove(0)),
                _ => Err(TargetError::InvalidParams("expected one positional arg".into())),
            }
        }

        fn arity(&self) -> Arity {
            Arity::Positional(1)
        }
    }

    #[tokio::test]
    async fn dispatches_a_request_to_a_matching_target() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), identity_transform());
        dispatcher.add_target("echo", Echo, TargetOptions::default());

        let req = Message::request(Id::number(1), "echo", Some(json!(["hi"])));
        let response = dispatcher.dispatch(req, CancelToken::none()).await.unwrap();
        assert_eq!(response, Message::result(Id::number(1), json!("hi")));
    }

    #[tokio::test]
    async fn unknown_method_on_a_request_yields_method_not_found() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), identity_transform());
        let req = Message::request(Id::number(3), "nope", None);
        let response = dispatcher.dispatch(req, CancelToken::none()).await.unwrap();
        assert_eq!(
            response,
            Message::error(Id::number(3), RpcErrorCode::METHOD_NOT_FOUND, "method not found: nope", None)
        );
    }

    #[tokio::test]
    async fn unknown_method_on_a_notification_is_dropped() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), identity_transform());
        let note = Message::notification("nope", None);
        assert!(dispatcher.dispatch(note, CancelToken::none()).await.is_none());
    }

    #[tokio::test]
    async fn mismatched_arity_yields_method_not_found() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), identity_transform());
        dispatcher.add_target("echo", Echo, TargetOptions::default());

        let req = Message::request(Id::number(1), "echo", Some(json!(["a", "b"])));
        let response = dispatcher.dispatch(req, CancelToken::none()).await.unwrap();
        assert!(matches!(response, Message::Error { code, .. } if code == RpcErrorCode::METHOD_NOT_FOUND));
    }

    #[tokio::test]
    async fn name_transform_is_applied_at_registration_and_resolution() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default(), camel_case_transform());
        dispatcher.add_target("say_hello", Echo, TargetOptions::default());

        let req = Message::request(Id::number(1), "sayHello", Some(json!(["hi"])));
        let response = dispatcher.dispatch(req, CancelToken::none()).await.unwrap();
        assert_eq!(response, Message::result(Id::number(1), json!("hi")));
    }

    #[tokio::test]
    async fn semaphore_gate_bounds_concurrent_permits() {
        let dispatcher = Dispatcher::new(
            DispatcherConfig {
                max_concurrent_inbound: Some(1),
                ..Default::default()
            },
            identity_transform(),
        );

        let _permit = dispatcher.acquire_permit().await;
        let dispatcher = Arc::new(dispatcher);
        let d2 = Arc::clone(&dispatcher);
        let attempt = tokio::time::timeout(std::time::Duration::from_millis(50), async move {
            d2.acquire_permit().await
        })
        .await;
        assert!(attempt.is_err(), "second permit should stall while first is held");
    }
}
