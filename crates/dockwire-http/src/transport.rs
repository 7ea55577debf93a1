//! One-shot and streaming request execution.

use crate::error::{Result, TransportError};
use crate::request::Request;
use crate::response::{
    error_body_text, find_header_end, parse_response, Headers, Response, ResponseHead,
    HEADER_TERMINATOR,
};
use crate::stream::{self, BodyPipeline, StreamCallbacks, StreamHandle, READ_BUFFER_SIZE};
use crate::target::{BoxedConnection, Connector, Target, TargetConnector};
use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on how much of an error body a streaming request reads.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// HTTP transport to a single daemon.
///
/// Every request opens its own connection through the configured
/// [`Connector`]; nothing is pooled or reused.
#[derive(Debug, Clone)]
pub struct Transport {
    connector: Arc<dyn Connector>,
}

impl Transport {
    /// Create a transport that dials `target` directly.
    pub fn new(target: Target) -> Self {
        Self::with_connector(TargetConnector::new(target))
    }

    /// Create a transport over a custom connector.
    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Point subsequent requests at a different target.
    ///
    /// Streams that are already running keep their connection.
    pub fn set_target(&mut self, target: Target) {
        tracing::debug!(target_addr = %target, "Transport target changed");
        self.connector = Arc::new(TargetConnector::new(target));
    }

    /// Send a request and buffer the whole response.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Connection`] if the socket cannot be opened
    /// - [`TransportError::MalformedResponse`] if the response cannot be parsed
    /// - [`TransportError::Http`] for non-2xx statuses
    pub async fn request(&self, method: &str, path: &str, body: Option<&str>) -> Result<Response> {
        let request = build_request(method, path, body);
        tracing::debug!(method = %method, path = %path, "Sending request");

        let mut conn = self.connector.connect().await?;
        conn.write_all(&request.encode(&self.connector.host(), false))
            .await?;
        conn.flush().await?;

        let mut raw = Vec::with_capacity(READ_BUFFER_SIZE);
        conn.read_to_end(&mut raw).await?;
        drop(conn);
        tracing::trace!(bytes = raw.len(), "Response received");

        let response = parse_response(&raw).inspect_err(|e| {
            tracing::debug!(method = %method, path = %path, error = %e, "Request failed");
        })?;
        tracing::debug!(
            method = %method,
            path = %path,
            status = response.status,
            body_len = response.body.len(),
            "Request complete"
        );
        Ok(response)
    }

    /// Send a request and return only the decoded body.
    pub async fn request_bytes(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<Bytes> {
        Ok(self.request(method, path, body).await?.body)
    }

    /// Send a request whose body is consumed incrementally.
    ///
    /// Resolves once the response headers have been validated. Body data is
    /// then delivered to `callbacks` from a background task until EOF, error
    /// or [`StreamHandle::cancel`].
    ///
    /// # Errors
    ///
    /// - [`TransportError::Connection`] if the socket cannot be opened
    /// - [`TransportError::PrematureClose`] if the connection closes before
    ///   the headers are complete
    /// - [`TransportError::MalformedResponse`] for an invalid status line
    /// - [`TransportError::Http`] for non-2xx statuses
    pub async fn request_stream(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
        callbacks: StreamCallbacks<Bytes>,
    ) -> Result<StreamHandle> {
        let request = build_request(method, path, body);
        tracing::debug!(method = %method, path = %path, "Opening stream");

        let mut conn = self.connector.connect().await?;
        conn.write_all(&request.encode(&self.connector.host(), true))
            .await?;
        conn.flush().await?;

        let (head, remainder) = read_head(&mut conn).await?;

        if !head.is_success() {
            let body = read_error_body(&mut conn, &head.headers, remainder).await;
            tracing::debug!(path = %path, status = head.status, "Stream request rejected");
            return Err(TransportError::Http {
                code: head.status,
                body: error_body_text(&head.headers, &body),
            });
        }

        let pipeline = BodyPipeline::for_headers(&head.headers);
        tracing::debug!(
            path = %path,
            status = head.status,
            chunked = matches!(pipeline, BodyPipeline::Chunked { .. }),
            "Stream established"
        );
        Ok(stream::start(conn, pipeline, &remainder, callbacks))
    }
}

fn build_request(method: &str, path: &str, body: Option<&str>) -> Request {
    let request = Request::new(method, path);
    match body {
        Some(body) => request.with_body(body),
        None => request,
    }
}

/// Read until the header terminator; returns the head and any body bytes
/// that arrived in the same reads.
async fn read_head(conn: &mut BoxedConnection) -> Result<(ResponseHead, BytesMut)> {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        if let Some(end) = find_header_end(&buf) {
            let head = ResponseHead::parse(&buf[..end])?;
            buf.advance(end + HEADER_TERMINATOR.len());
            return Ok((head, buf));
        }

        buf.reserve(READ_BUFFER_SIZE);
        let n = conn.read_buf(&mut buf).await?;
        if n == 0 {
            tracing::debug!(buffered = buf.len(), "Connection closed inside headers");
            return Err(TransportError::PrematureClose);
        }
    }
}

/// Collect an error body without waiting on a kept-alive connection.
///
/// Reads up to `Content-Length` when the daemon sent one; otherwise only the
/// bytes already buffered are used.
async fn read_error_body(conn: &mut BoxedConnection, headers: &Headers, mut buf: BytesMut) -> Vec<u8> {
    if let Some(len) = headers.content_length() {
        let len = len.min(MAX_ERROR_BODY);
        while buf.len() < len {
            buf.reserve(len - buf.len());
            match conn.read_buf(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        buf.truncate(len);
    }
    buf.to_vec()
}
