//! HTTP/1.1 response parsing.

use crate::chunked::decode_chunked;
use crate::error::{Result, TransportError};
use bytes::Bytes;

/// Blank line separating headers from body.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Offset of the first CR LF CR LF in `buf`, if present.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Response headers in arrival order, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any `Transfer-Encoding` header mentions `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.get_all("transfer-encoding")
            .any(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Parsed `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Number of header lines.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Numeric status code.
    pub status: u16,
    /// Reason phrase (may be empty).
    pub reason: String,
    /// Response headers.
    pub headers: Headers,
}

impl ResponseHead {
    /// Parse the header block (everything before CR LF CR LF).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedResponse`] if the status line is
    /// missing or its code is not numeric.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(head);
        let mut lines = text.split("\r\n");

        let status_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| TransportError::malformed("empty status line"))?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(TransportError::malformed(format!(
                "invalid status line {status_line:?}"
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| {
                TransportError::malformed(format!("invalid status code in {status_line:?}"))
            })?;
        let reason = parts.next().unwrap_or_default().to_string();

        let headers = lines
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Ok(Self {
            status,
            reason,
            headers: Headers(headers),
        })
    }

    /// Whether the status is in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Numeric status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Body with transfer encoding removed.
    pub body: Bytes,
}

/// Text for an error body, de-chunking leniently when needed.
pub(crate) fn error_body_text(headers: &Headers, body: &[u8]) -> String {
    if headers.is_chunked() {
        if let Ok(decoded) = decode_chunked(body) {
            return String::from_utf8_lossy(&decoded).trim_end().to_string();
        }
    }
    String::from_utf8_lossy(body).trim_end().to_string()
}

/// Parse a complete raw response as read from the socket.
///
/// # Errors
///
/// - [`TransportError::MalformedResponse`] if there is no header terminator,
///   the status line is invalid, or a chunk size cannot be parsed
/// - [`TransportError::Http`] if the status is outside 2xx
pub fn parse_response(raw: &[u8]) -> Result<Response> {
    let header_end = find_header_end(raw)
        .ok_or_else(|| TransportError::malformed("missing header terminator"))?;

    let head = ResponseHead::parse(&raw[..header_end])?;
    let body = &raw[header_end + HEADER_TERMINATOR.len()..];

    if !head.is_success() {
        return Err(TransportError::Http {
            code: head.status,
            body: error_body_text(&head.headers, body),
        });
    }

    let body = if head.headers.is_chunked() {
        Bytes::from(decode_chunked(body)?)
    } else {
        Bytes::copy_from_slice(body)
    };

    Ok(Response {
        status: head.status,
        headers: head.headers,
        body,
    })
}
