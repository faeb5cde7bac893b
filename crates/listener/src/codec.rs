//! Supervisor event-listener wire codec.
//!
//! The supervisor talks to its listeners over the listener's stdin/stdout:
//!
//! ```text
//! listener -> supervisor   READY\n
//! supervisor -> listener   ver:3.0 server:supervisor serial:21 ... eventname:PROCESS_STATE_EXITED len:54\n
//!                          <54 bytes of payload>
//! listener -> supervisor   RESULT 2\nOK
//! ```
//!
//! The supervisor's parser is rigid: a `RESULT` length that does not match
//! its payload, or any stray byte on stdout, desynchronises the channel for
//! good. [`EventWriter`] therefore writes each frame with a single
//! `write_all` and flushes immediately.

use events::{HeaderMap, MalformedEvent};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame the listener sends when it can accept the next event.
pub const READY_FRAME: &[u8] = b"READY\n";

/// Result payload acknowledging an event.
pub const RESULT_OK: &[u8] = b"OK";

/// Upper bound on a declared payload length. Supervisor payloads are a few
/// hundred bytes; a larger value means the stream is corrupt.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// The inbound stream violated the listener protocol.
///
/// Every variant is fatal: once framing is lost there is no way to find the
/// start of the next envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reading stdin or writing stdout failed.
    #[error("protocol stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A header token is not of the form `key:value`, or the line is not UTF-8.
    #[error("malformed envelope header token '{token}'")]
    MalformedHeader {
        /// The offending token (or a lossy rendering of the line).
        token: String,
    },

    /// A header the envelope must carry is absent.
    #[error("envelope header is missing required key '{key}'")]
    MissingHeader {
        /// The absent key.
        key: &'static str,
    },

    /// The `len` header is not a non-negative integer within bounds.
    #[error("envelope declares invalid payload length '{value}'")]
    InvalidLength {
        /// The raw `len` value.
        value: String,
    },

    /// The stream ended inside a header line.
    #[error("stream ended inside an envelope header ({partial} bytes read)")]
    IncompleteHeader {
        /// Bytes of the unterminated line.
        partial: usize,
    },

    /// The stream ended before the declared payload was read in full.
    #[error("payload truncated: expected {expected} bytes, got {received}")]
    Truncated {
        /// Declared length.
        expected: usize,
        /// Bytes actually available.
        received: usize,
    },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One event as framed by the supervisor: a header map plus a raw payload.
///
/// An envelope always has an `eventname` header, and its `len` header always
/// equals `payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    headers: HeaderMap,
    payload: Vec<u8>,
}

impl EventEnvelope {
    /// Builds an envelope for `event_name`, setting `eventname` and `len`
    /// in `headers` to match.
    pub fn new(mut headers: HeaderMap, event_name: &str, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        headers.insert("eventname", event_name);
        headers.insert("len", payload.len().to_string());
        Self { headers, payload }
    }

    /// The `eventname` header, e.g. `PROCESS_STATE_EXITED` or `TICK_60`.
    pub fn event_name(&self) -> &str {
        self.headers.get("eventname").unwrap_or_default()
    }

    /// Envelope headers in wire order.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialises the envelope exactly as the supervisor would send it.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.headers.to_string().into_bytes();
        out.push(b'\n');
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Encodes a `RESULT <n>\n<payload>` frame.
pub fn encode_result(payload: &[u8]) -> Vec<u8> {
    let mut out = format!("RESULT {}\n", payload.len()).into_bytes();
    out.extend_from_slice(payload);
    out
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Pull-based reader of [`EventEnvelope`]s from the supervisor stream.
#[derive(Debug)]
pub struct EventReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> EventReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(256),
        }
    }

    /// Reads the next envelope.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between envelopes.
    pub async fn read_event(&mut self) -> Result<Option<EventEnvelope>, ProtocolError> {
        self.line.clear();
        let n = self.inner.read_until(b'\n', &mut self.line).await?;
        if n == 0 {
            return Ok(None);
        }
        if self.line.last() != Some(&b'\n') {
            return Err(ProtocolError::IncompleteHeader { partial: n });
        }

        let headers = parse_header_line(&self.line)?;
        if headers.get("eventname").is_none() {
            return Err(ProtocolError::MissingHeader { key: "eventname" });
        }
        let raw_len = headers
            .get("len")
            .ok_or(ProtocolError::MissingHeader { key: "len" })?;
        let len = raw_len
            .parse::<usize>()
            .ok()
            .filter(|len| *len <= MAX_PAYLOAD_LEN)
            .ok_or_else(|| ProtocolError::InvalidLength {
                value: raw_len.to_string(),
            })?;

        let payload = read_payload(&mut self.inner, len).await?;
        Ok(Some(EventEnvelope { headers, payload }))
    }
}

fn parse_header_line(line: &[u8]) -> Result<HeaderMap, ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::MalformedHeader {
        token: String::from_utf8_lossy(line).trim_end().to_string(),
    })?;
    let text = text.trim_end_matches(['\n', '\r']);
    HeaderMap::parse(text).map_err(|e| match e {
        MalformedEvent::InvalidToken { token } => ProtocolError::MalformedHeader { token },
        other => ProtocolError::MalformedHeader {
            token: other.to_string(),
        },
    })
}

async fn read_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut payload[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::Truncated {
                expected: len,
                received: filled,
            });
        }
        filled += n;
    }
    Ok(payload)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes listener frames to the supervisor.
#[derive(Debug)]
pub struct EventWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> EventWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Signals that the listener can accept the next event.
    pub async fn ready(&mut self) -> Result<(), ProtocolError> {
        self.write_frame(READY_FRAME).await
    }

    /// Acknowledges the current event.
    pub async fn ok(&mut self) -> Result<(), ProtocolError> {
        self.result(RESULT_OK).await
    }

    /// Writes a `RESULT` frame carrying `payload`.
    async fn result(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        self.write_frame(&encode_result(payload)).await
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ProtocolError> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
