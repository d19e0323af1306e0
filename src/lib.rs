//! A bidirectional JSON-RPC 2.0 engine over an arbitrary duplex byte
//! transport.
//!
//! The crate is organized bottom-up, each layer depending only on the one
//! below it:
//!
//! - [`message`] — wire types (`Message`, `Id`, `Arguments`) shared by every
//!   other layer.
//! - [`formatter`] — the value/bytes codec boundary (`Formatter` and its two
//!   optional capabilities).
//! - [`framing`] — turns a byte stream into discrete frames and back
//!   (`MessageHandler`), with length-prefixed and header-delimited
//!   implementations.
//! - [`correlation`] — the outstanding-request table that matches outbound
//!   calls with their responses.
//! - [`dispatcher`] — routes inbound requests/notifications to locally
//!   registered [`dispatcher::Target`]s and bounds inbound concurrency.
//! - [`session`] — ties the above into one connection: the read loop, write
//!   serialization, and the connection's lifecycle.
//! - [`cancel`] — the cancellation primitive used throughout.
//! - [`transport`] — the error type shared by framing when the underlying
//!   byte channel misbehaves; the channel itself is any
//!   `AsyncRead + AsyncWrite`, supplied by the caller.
//! - [`error`] — the error-code catalogue and the top-level [`error::SessionError`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use duplex_rpc::cancel::CancelToken;
//! use duplex_rpc::dispatcher::{Target, TargetError, TargetOptions};
//! use duplex_rpc::formatter::JsonFormatter;
//! use duplex_rpc::framing::LengthPrefixedHandler;
//! use duplex_rpc::message::{Arguments, ProtocolMode};
//! use duplex_rpc::session::Session;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Target for Echo {
//!     async fn call(
//!         &self,
//!         args: Arguments,
//!         _cancel: CancelToken,
//!     ) -> Result<serde_json::Value, TargetError> {
//!         Ok(args.into_params().unwrap_or(serde_json::Value::Null))
//!     }
//! }
//!
//! # async fn run(transport: tokio::io::DuplexStream) -> Result<(), Box<dyn std::error::Error>> {
//! let formatter = Arc::new(JsonFormatter::new(ProtocolMode::V2));
//! let handler = LengthPrefixedHandler::new(transport, formatter, Default::default());
//! let session = Session::new(handler);
//! session.add_local_target("echo", Echo, TargetOptions::default());
//! session.start_listening().await?;
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod framing;
pub mod message;
pub mod session;
pub mod transport;

pub use error::{RpcErrorCode, SessionError};
pub use message::{Arguments, Id, Message, ProtocolMode};
pub use session::Session;

/// The crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
