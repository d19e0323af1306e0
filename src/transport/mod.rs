//! The underlying duplex byte transport.
//!
//! This crate treats the byte channel itself as an external collaborator: any
//! `tokio::io::AsyncRead + AsyncWrite` pair (a socket, a pipe, an in-memory
//! `tokio::io::duplex`) suffices. This module only carries the error type
//! shared by the framing layer when the channel misbehaves.

pub mod error;

pub use error::TransportError;
