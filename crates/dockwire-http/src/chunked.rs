//! Chunked transfer-encoding decoders.
//!
//! Two flavours share the size-line parser:
//!
//! - [`decode_chunked`] works on a complete body. A size line that is not
//!   valid hex is an error, while a final chunk that declares more bytes than
//!   remain is accepted as-is (truncated streams still yield their data).
//! - [`ChunkedDecoder`] is a `tokio_util` codec for live streams. It yields
//!   each complete chunk as soon as it is buffered and skips over a bad size
//!   line instead of failing, so one corrupt frame does not end the stream.

use crate::error::{Result, TransportError};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

const CRLF: &[u8] = b"\r\n";

/// Largest chunk size accepted from a size line.
///
/// Daemon chunks are a few KiB; anything beyond this is treated as a corrupt
/// size line rather than a buffer to allocate.
pub const MAX_CHUNK_LEN: usize = 64 * 1024 * 1024;

/// Position of the first CRLF in `buf`.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

/// Parse a chunk-size line, ignoring chunk extensions after `;`.
///
/// Sizes above [`MAX_CHUNK_LEN`] are rejected like non-hex lines.
fn parse_chunk_size(line: &[u8]) -> Option<usize> {
    let line = std::str::from_utf8(line).ok()?;
    let size = line.split(';').next()?.trim();
    if size.is_empty() {
        return None;
    }
    usize::from_str_radix(size, 16)
        .ok()
        .filter(|&size| size <= MAX_CHUNK_LEN)
}

/// Decode a fully buffered chunked body.
///
/// Stops at the zero-size chunk; trailer headers after it are ignored.
///
/// # Errors
///
/// Returns [`TransportError::MalformedResponse`] if a size line is not valid
/// hexadecimal (or exceeds [`MAX_CHUNK_LEN`]), or if a chunk's data is not
/// followed by CRLF.
pub fn decode_chunked(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut pos = 0;

    while pos < body.len() {
        let Some(line_len) = find_crlf(&body[pos..]) else {
            tracing::debug!(offset = pos, "Chunk size line without terminator, stopping");
            break;
        };

        let line = &body[pos..pos + line_len];
        let size = parse_chunk_size(line).ok_or_else(|| {
            TransportError::malformed(format!(
                "invalid chunk size line {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;
        if size == 0 {
            break;
        }

        let data_start = pos + line_len + CRLF.len();
        let available = body.len().saturating_sub(data_start);
        if size > available {
            tracing::debug!(declared = size, available, "Final chunk truncated");
            out.extend_from_slice(&body[data_start.min(body.len())..]);
            break;
        }

        let data_end = data_start + size;
        out.extend_from_slice(&body[data_start..data_end]);

        let terminator = &body[data_end..body.len().min(data_end + CRLF.len())];
        if terminator.len() == CRLF.len() && terminator != CRLF {
            return Err(TransportError::malformed(format!(
                "chunk of {size} bytes not followed by CRLF"
            )));
        }
        pos = data_end + CRLF.len();
    }

    Ok(out)
}

/// Incremental chunked decoder for streaming responses.
///
/// Feed it through a `BytesMut` buffer that accumulates raw socket reads;
/// every call to `decode` yields at most one chunk payload.
#[derive(Debug, Default)]
pub struct ChunkedDecoder {
    finished: bool,
}

impl ChunkedDecoder {
    /// Create a decoder at the start of a chunked body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminating zero-size chunk has been consumed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Decoder for ChunkedDecoder {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            if self.finished {
                src.clear();
                return Ok(None);
            }

            let Some(line_len) = find_crlf(src) else {
                return Ok(None);
            };

            let Some(size) = parse_chunk_size(&src[..line_len]) else {
                tracing::warn!(
                    line = %String::from_utf8_lossy(&src[..line_len]),
                    "Skipping unparsable chunk size line"
                );
                src.advance(line_len + CRLF.len());
                continue;
            };

            if size == 0 {
                tracing::trace!("Terminating chunk received");
                self.finished = true;
                src.clear();
                return Ok(None);
            }

            let needed = (line_len + CRLF.len())
                .checked_add(size)
                .and_then(|n| n.checked_add(CRLF.len()));
            match needed {
                Some(needed) if src.len() >= needed => {}
                Some(_) => return Ok(None),
                None => {
                    tracing::warn!(declared = size, "Skipping chunk size that overflows");
                    src.advance(line_len + CRLF.len());
                    continue;
                }
            }

            src.advance(line_len + CRLF.len());
            let data = src.split_to(size).freeze();
            src.advance(CRLF.len());
            return Ok(Some(data));
        }
    }
}
