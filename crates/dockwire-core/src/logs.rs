//! Docker log stream decoding.
//!
//! Containers without a TTY have their stdout and stderr multiplexed onto one
//! stream. Each frame carries an 8-byte header:
//!
//! ```text
//! ┌──────┬──────────┬───────────────────┬─────────────┐
//! │ type │ 0  0  0  │ length (u32, BE)  │ payload ... │
//! └──────┴──────────┴───────────────────┴─────────────┘
//!   0 = stdin, 1 = stdout, 2 = stderr
//! ```
//!
//! Containers with a TTY send raw text instead. [`LogFrameDecoder`] picks the
//! mode from the first byte it sees.

use bytes::{Buf, BytesMut};
use std::fmt;
use tokio_util::codec::Decoder;

/// Length of a multiplexed frame header.
pub const FRAME_HEADER_LEN: usize = 8;

/// Default upper bound on a plausible frame length.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1_000_000;

/// Stream type byte for stderr frames.
const STDERR: u8 = 2;

/// Which output stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// A single decoded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub stream: LogStream,
}

impl LogLine {
    fn new(text: impl Into<String>, stream: LogStream) -> Self {
        Self {
            text: text.into(),
            stream,
        }
    }
}

/// Whether a stream starting with `first` uses multiplexed framing.
pub fn is_multiplexed(first: u8) -> bool {
    first <= STDERR
}

fn frame_len(header: &[u8]) -> usize {
    u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize
}

/// Decode a complete multiplexed log body into flat text.
///
/// Frame boundaries and stream types are discarded. A trailing partial
/// header is dropped; a truncated payload is decoded as far as it goes.
pub fn decode_log_frames(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut pos = 0;

    while bytes.len() - pos >= FRAME_HEADER_LEN {
        let len = frame_len(&bytes[pos..pos + FRAME_HEADER_LEN]);
        let start = pos + FRAME_HEADER_LEN;
        let end = start.saturating_add(len);

        if end > bytes.len() {
            out.push_str(&String::from_utf8_lossy(&bytes[start..]));
            break;
        }

        out.push_str(&String::from_utf8_lossy(&bytes[start..end]));
        pos = end;
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Undetected,
    Multiplexed,
    Raw,
}

/// Incremental decoder for live log streams.
///
/// Multiplexed frames are emitted only once complete, with trailing
/// whitespace stripped; blank frames are skipped. In raw mode every
/// newline-terminated line is emitted as stdout and the last partial line
/// stays buffered.
///
/// A frame header declaring more than `max_frame_len` bytes means the stream
/// was misdetected; the decoder then switches to raw mode for good.
#[derive(Debug)]
pub struct LogFrameDecoder {
    mode: Mode,
    max_frame_len: usize,
}

impl Default for LogFrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            mode: Mode::Undetected,
            max_frame_len,
        }
    }

    /// Whether the stream is being decoded as raw text.
    pub fn is_raw(&self) -> bool {
        self.mode == Mode::Raw
    }

    /// Whether the stream has been detected as multiplexed.
    pub fn is_multiplexed(&self) -> bool {
        self.mode == Mode::Multiplexed
    }

    fn decode_raw(src: &mut BytesMut) -> Option<LogLine> {
        let newline = src.iter().position(|b| *b == b'\n')?;
        let line = src.split_to(newline + 1);
        Some(LogLine::new(
            String::from_utf8_lossy(&line[..newline]),
            LogStream::Stdout,
        ))
    }

    fn decode_frame(&mut self, src: &mut BytesMut) -> Option<LogLine> {
        loop {
            if src.len() < FRAME_HEADER_LEN {
                return None;
            }

            let len = frame_len(&src[..FRAME_HEADER_LEN]);
            if len > self.max_frame_len {
                tracing::warn!(
                    declared = len,
                    limit = self.max_frame_len,
                    "Implausible log frame length, switching to raw mode"
                );
                self.mode = Mode::Raw;
                return Self::decode_raw(src);
            }

            let total = FRAME_HEADER_LEN + len;
            if src.len() < total {
                src.reserve(total - src.len());
                return None;
            }

            let stream = if src[0] == STDERR {
                LogStream::Stderr
            } else {
                LogStream::Stdout
            };
            src.advance(FRAME_HEADER_LEN);
            let payload = src.split_to(len);
            let text = String::from_utf8_lossy(&payload);
            let text = text.trim_end();
            if text.is_empty() {
                continue;
            }
            return Some(LogLine::new(text, stream));
        }
    }
}

impl Decoder for LogFrameDecoder {
    type Item = LogLine;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogLine>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if self.mode == Mode::Undetected {
            self.mode = if is_multiplexed(src[0]) {
                Mode::Multiplexed
            } else {
                Mode::Raw
            };
            tracing::debug!(mode = ?self.mode, "Log stream mode detected");
        }

        Ok(match self.mode {
            Mode::Raw => Self::decode_raw(src),
            _ => self.decode_frame(src),
        })
    }

    /// Emits the final unterminated raw line; a partial frame is dropped.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<LogLine>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }

        if self.mode == Mode::Raw {
            let rest = src.split();
            return Ok(Some(LogLine::new(
                String::from_utf8_lossy(&rest),
                LogStream::Stdout,
            )));
        }

        tracing::debug!(bytes = src.len(), "Dropping partial log frame at end of stream");
        src.clear();
        Ok(None)
    }
}

/// Options for log retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep the connection open and stream new output.
    pub follow: bool,
    /// Number of lines from the end (`all` or a number).
    pub tail: String,
    /// Prefix each line with an RFC 3339 timestamp.
    pub timestamps: bool,
    /// Only logs since this UNIX timestamp.
    pub since: Option<i64>,
    /// Only logs before this UNIX timestamp.
    pub until: Option<i64>,
    pub stdout: bool,
    pub stderr: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            follow: false,
            tail: crate::config::DEFAULT_LOG_TAIL.to_string(),
            timestamps: false,
            since: None,
            until: None,
            stdout: true,
            stderr: true,
        }
    }
}

impl LogOptions {
    /// Set the tail count.
    pub fn tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = tail.into();
        self
    }

    /// Enable or disable timestamps.
    pub fn timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Query string for `/containers/{id}/logs`, without the leading `?`.
    pub fn to_query(&self) -> String {
        let mut query = format!(
            "follow={}&stdout={}&stderr={}&timestamps={}&tail={}",
            self.follow,
            self.stdout,
            self.stderr,
            self.timestamps,
            urlencoding::encode(&self.tail)
        );
        if let Some(since) = self.since {
            query.push_str(&format!("&since={since}"));
        }
        if let Some(until) = self.until {
            query.push_str(&format!("&until={until}"));
        }
        query
    }
}
