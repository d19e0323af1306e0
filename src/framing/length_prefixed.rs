//! Length-prefixed framing: each message is preceded by a 4-byte big-endian
//! unsigned payload length.
//!
//! Reads and writes the length prefix directly off the live transport halves
//! rather than through a codec, so a large payload can be handed straight
//! into the formatter's [`crate::formatter::CanDecodeAsync`] path as a
//! bounded live sub-stream instead of being fully buffered first.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::cancel::CancelToken;
use crate::formatter::Formatter;
use crate::framing::{FramingConfig, FramingError, MessageHandler, ReadOutcome};
use crate::message::Message;

const LENGTH_PREFIX_BYTES: usize = 4;

/// `T` is a single object implementing both halves of the duplex transport
/// (a real socket, `tokio::io::DuplexStream`, or any other combined
/// `AsyncRead + AsyncWrite`).
pub struct LengthPrefixedHandler<T> {
    reader: Mutex<ReadHalf<T>>,
    writer: Mutex<WriteHalf<T>>,
    formatter: Arc<dyn Formatter>,
    config: FramingConfig,
}

impl<T> LengthPrefixedHandler<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(transport: T, formatter: Arc<dyn Formatter>, config: FramingConfig) -> Self {
        let (read_half, write_half) = split(transport);
        Self {
            reader: Mutex::new(read_half),
            writer: Mutex::new(write_half),
            formatter,
            config,
        }
    }

    /// Reads the 4-byte big-endian length prefix. Returns `None` on clean EOF
    /// before any prefix bytes were read; an EOF partway through the prefix
    /// or the payload is a desynchronizing [`FramingError::UnexpectedEof`].
    async fn read_length_prefix(reader: &mut ReadHalf<T>) -> Result<Option<u32>, FramingError> {
        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        let n = reader.read(&mut len_buf[..1]).await?;
        if n == 0 {
            return Ok(None);
        }
        reader
            .read_exact(&mut len_buf[1..])
            .await
            .map_err(|_| FramingError::UnexpectedEof)?;
        Ok(Some(u32::from_be_bytes(len_buf)))
    }
}

#[async_trait]
impl<T> MessageHandler for LengthPrefixedHandler<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_async(&self, cancel: CancelToken) -> Result<ReadOutcome, FramingError> {
        let mut reader = self.reader.lock().await;

        let len = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FramingError::Cancelled),
            len = Self::read_length_prefix(&mut reader) => len?,
        };
        let len = match len {
            None => return Ok(ReadOutcome::Eof),
            Some(len) => len as usize,
        };

        if len > self.config.max_frame_len {
            return Err(FramingError::LengthOverflow(len));
        }

        trace!(len, "read length-prefixed frame");

        if len > self.config.async_decode_threshold {
            if let Some(async_formatter) = self.formatter.as_decode_async() {
                let mut bounded = (&mut *reader).take(len as u64);
                return match async_formatter.decode_async(&mut bounded, len).await {
                    Ok(msg) => Ok(ReadOutcome::Message(msg)),
                    Err(e) => Ok(ReadOutcome::DecodeError(e)),
                };
            }
        }

        let mut buf = vec![0u8; len];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|_| FramingError::UnexpectedEof)?;

        match self.formatter.decode(&buf) {
            Ok(msg) => Ok(ReadOutcome::Message(msg)),
            Err(e) => Ok(ReadOutcome::DecodeError(e)),
        }
    }

    async fn write_async(&self, message: &Message, cancel: CancelToken) -> Result<(), FramingError> {
        let payload = self
            .formatter
            .encode(message)
            .map_err(|e| FramingError::HeaderParse(e.to_string()))?;
        if payload.len() > self.config.max_frame_len {
            return Err(FramingError::LengthOverflow(payload.len()));
        }

        let len = payload.len() as u32;
        let mut writer = self.writer.lock().await;
        let write_fut = async {
            writer.write_all(&len.to_be_bytes()).await?;
            writer.write_all(&payload).await?;
            writer.flush().await
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FramingError::Cancelled),
            res = write_fut => res.map_err(FramingError::Io),
        }
    }

    async fn dispose(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            warn!(error = %e, "error shutting down length-prefixed writer");
        }
    }
}
