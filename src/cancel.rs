//! A minimal broadcast-once cancellation primitive.
//!
//! Modeled on the stdio transport's shutdown broadcast: a single owner fires
//! the signal, any number of clones can await it or poll it without holding a
//! lock. Used for the session's lifetime token, per-inbound-request
//! cancellation, and caller-side invoke cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// The cancel-firing half. Dropping it without calling [`CancelSource::cancel`]
/// leaves any outstanding [`CancelToken`] permanently un-cancelled.
#[derive(Debug, Clone)]
pub struct CancelSource {
    inner: Arc<Inner>,
}

/// The observing half, freely cloneable.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let inner = Arc::new(Inner {
        cancelled: AtomicBool::new(false),
        notify: Notify::new(),
    });
    (
        CancelSource {
            inner: inner.clone(),
        },
        CancelToken { inner },
    )
}

impl CancelSource {
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            inner: self.inner.clone(),
        }
    }
}

impl CancelToken {
    /// A token that can never fire; used where the caller has no cancellation
    /// source of its own.
    pub fn none() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, otherwise waits for the
    /// source to fire.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }

    /// A token that fires as soon as either `self` or `other` fires.
    ///
    /// Used to combine a per-request cancellation source with the session's
    /// lifetime token, so an inbound dispatch aborts on whichever happens
    /// first.
    pub fn any(self, other: CancelToken) -> CancelToken {
        let (source, token) = cancel_pair();
        tokio::spawn(async move {
            tokio::select! {
                _ = self.cancelled() => {}
                _ = other.cancelled() => {}
            }
            source.cancel();
        });
        token
    }
}

/// Alias used on the public session API: the caller-visible handle for
/// cancelling an outbound [`crate::session::Session::invoke_cancellable`] call.
pub type CancelHandle = CancelSource;
