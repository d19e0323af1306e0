//! The [`Target`] trait: one locally registered method implementation.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::message::{ArgShape, Arguments};

/// What a [`Target`] declares it accepts, used to resolve overloads when
/// several targets share a method name and differ in positional arity or
/// named-parameter signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    /// Accepts any shape, including no arguments. The fallback match.
    Any,
    /// Requires exactly this many positional arguments.
    Positional(usize),
    /// Requires a named-argument object containing at least these keys.
    Named(Vec<String>),
}

impl Arity {
    /// Does `shape` coerce to this arity? `Any` always matches; an exact
    /// positional count must match exactly; a named arity matches an object
    /// containing every required key (extras are ignored).
    pub fn matches(&self, shape: &ArgShape) -> bool {
        match (self, shape) {
            (Arity::Any, _) => true,
            (Arity::Positional(n), ArgShape::Positional(m)) => n == m,
            (Arity::Positional(0), ArgShape::Empty) => true,
            (Arity::Named(required), ArgShape::Named(given)) => {
                required.iter().all(|key| given.contains(key))
            }
            _ => false,
        }
    }
}

/// Errors a [`Target::call`] implementation can return. The dispatcher maps
/// each to a JSON-RPC error response — these never propagate
/// out of the dispatcher as Rust errors.
#[derive(Debug, Clone, Error)]
pub enum TargetError {
    /// A domain-specific failure; becomes `InvocationError (-32000)` with a
    /// `{type, message, stack?}` data payload.
    #[error("{message}")]
    Domain {
        error_type: String,
        message: String,
        data: Option<Value>,
    },

    /// The target itself rejected its coerced arguments; becomes
    /// `InvalidParams (-32602)` directly, bypassing the dispatcher's own
    /// arity check.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The target honored its cancellation token; becomes
    /// `RequestCancelled`.
    #[error("cancelled")]
    Cancelled,
}

impl TargetError {
    pub fn domain(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        TargetError::Domain {
            error_type: error_type.into(),
            message: message.into(),
            data: None,
        }
    }
}

/// A locally registered method implementation.
///
/// One `Target` is one overload; register the same method name multiple
/// times with different [`Arity`]s to model an overload set.
#[async_trait]
pub trait Target: Send + Sync {
    async fn call(&self, args: Arguments, cancel: CancelToken) -> Result<Value, TargetError>;

    /// The argument shape this target accepts. Defaults to [`Arity::Any`].
    fn arity(&self) -> Arity {
        Arity::Any
    }
}

/// Per-registration behavior flags.
#[derive(Debug, Clone, Copy)]
pub struct TargetOptions {
    /// Whether this target may be invoked as a notification (no id, no
    /// reply expected). Defaults to `true`.
    pub allow_notifications: bool,
    /// Whether this target honors the cancellation token it is given.
    /// Informational only — the token is always passed; this flag exists so
    /// callers/diagnostics can tell whether honoring it is meaningful.
    pub allows_cancellation: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            allow_notifications: true,
            allows_cancellation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ArgShape;

    #[test]
    fn any_arity_matches_every_shape() {
        assert!(Arity::Any.matches(&ArgShape::Empty));
        assert!(Arity::Any.matches(&ArgShape::Positional(3)));
        assert!(Arity::Any.matches(&ArgShape::Named(vec!["x".into()])));
    }

    #[test]
    fn positional_arity_requires_exact_count() {
        assert!(Arity::Positional(2).matches(&ArgShape::Positional(2)));
        assert!(!Arity::Positional(2).matches(&ArgShape::Positional(1)));
    }

    #[test]
    fn named_arity_requires_subset_of_given_keys() {
        let arity = Arity::Named(vec!["a".into(), "b".into()]);
        assert!(arity.matches(&ArgShape::Named(vec!["a".into(), "b".into(), "c".into()])));
        assert!(!arity.matches(&ArgShape::Named(vec!["a".into()])));
    }
}
