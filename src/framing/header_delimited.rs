//! Header-delimited (HTTP-like) framing: zero or more `Name: Value\r\n`
//! header lines terminated by a blank line, then exactly `Content-Length`
//! payload bytes.
//!
//! Grounded on a sibling LSP-client example's header accumulation loop: a
//! strict `": "` separator (not arbitrary whitespace), `\r\n` line endings,
//! and a `Content-Type; charset=...` override honored only when the
//! formatter implements [`crate::formatter::CanHandleTextEncoding`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{
    split, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::cancel::CancelToken;
use crate::formatter::Formatter;
use crate::framing::{FramingConfig, FramingError, MessageHandler, ReadOutcome};
use crate::message::Message;

pub struct HeaderDelimitedHandler<T> {
    reader: Mutex<BufReader<ReadHalf<T>>>,
    writer: Mutex<WriteHalf<T>>,
    formatter: Arc<dyn Formatter>,
    config: FramingConfig,
}

impl<T> HeaderDelimitedHandler<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(transport: T, formatter: Arc<dyn Formatter>, config: FramingConfig) -> Self {
        let (read_half, write_half) = split(transport);
        Self {
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(write_half),
            formatter,
            config,
        }
    }

    /// Accumulates header lines until the blank-line terminator. Returns
    /// `None` on clean EOF before any header bytes were read.
    async fn read_headers(
        reader: &mut BufReader<ReadHalf<T>>,
    ) -> Result<Option<HashMap<String, String>>, FramingError> {
        let mut headers = HashMap::new();
        let mut saw_any_bytes = false;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return if saw_any_bytes {
                    Err(FramingError::UnexpectedEof)
                } else {
                    Ok(None)
                };
            }
            saw_any_bytes = true;

            if line == "\r\n" || line == "\n" {
                return Ok(Some(headers));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            let (name, value) = line.split_once(": ").ok_or_else(|| {
                FramingError::HeaderParse(format!("header line missing ': ' separator: {line:?}"))
            })?;
            headers.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    fn parse_charset(content_type: &str) -> Option<String> {
        content_type.split(';').skip(1).find_map(|param| {
            let param = param.trim();
            param
                .strip_prefix("charset=")
                .map(|v| v.trim_matches('"').to_string())
        })
    }
}

#[async_trait]
impl<T> MessageHandler for HeaderDelimitedHandler<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_async(&self, cancel: CancelToken) -> Result<ReadOutcome, FramingError> {
        let mut reader = self.reader.lock().await;

        let headers = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FramingError::Cancelled),
            headers = Self::read_headers(&mut reader) => headers?,
        };
        let headers = match headers {
            None => return Ok(ReadOutcome::Eof),
            Some(h) => h,
        };

        let content_length: usize = headers
            .get("content-length")
            .ok_or_else(|| FramingError::HeaderParse("missing Content-Length header".into()))?
            .parse()
            .map_err(|e| FramingError::HeaderParse(format!("bad Content-Length: {e}")))?;

        if content_length > self.config.max_frame_len {
            return Err(FramingError::LengthOverflow(content_length));
        }

        let charset = headers
            .get("content-type")
            .and_then(|ct| Self::parse_charset(ct));

        trace!(content_length, ?charset, "read header-delimited frame");

        if content_length > self.config.async_decode_threshold {
            if let Some(async_formatter) = self.formatter.as_decode_async() {
                return match async_formatter
                    .decode_async(&mut *reader, content_length)
                    .await
                {
                    Ok(msg) => Ok(ReadOutcome::Message(msg)),
                    Err(e) => Ok(ReadOutcome::DecodeError(e)),
                };
            }
        }

        let mut buf = vec![0u8; content_length];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|_| FramingError::UnexpectedEof)?;

        let decoded = match (charset, self.formatter.as_text_encoding()) {
            (Some(charset), Some(text_formatter)) if !charset.eq_ignore_ascii_case("utf-8") => {
                text_formatter.decode_with_encoding(&buf, &charset)
            }
            _ => self.formatter.decode(&buf),
        };

        match decoded {
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

        let header = format!("Content-Length: {}\r\n\r\n", payload.len());

        let mut writer = self.writer.lock().await;
        let write_fut = async {
            writer.write_all(header.as_bytes()).await?;
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
            warn!(error = %e, "error shutting down header-delimited writer");
        }
    }
}
