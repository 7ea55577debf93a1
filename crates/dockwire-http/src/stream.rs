//! Streaming responses: callbacks, handles and the background read loop.
//!
//! A streaming request hands its connection to a spawned task that owns the
//! socket, the body decoder and the data callback. The caller keeps a
//! [`StreamHandle`], which shares only the cancellation token and the
//! once-only close slot with that task.

use crate::chunked::ChunkedDecoder;
use crate::error::TransportError;
use crate::response::Headers;
use crate::target::BoxedConnection;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

/// Size of the buffer used for each socket read.
pub(crate) const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Callback receiving stream items.
pub type DataCallback<T> = Box<dyn FnMut(T) + Send>;
/// Callback receiving the single stream error.
pub type ErrorCallback<E> = Box<dyn FnOnce(E) + Send>;
/// Callback invoked once when the stream ends.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Callbacks for a streaming request.
///
/// `on_error` fires at most once and is always followed by `on_close`;
/// `on_close` fires exactly once per stream, whether the stream ended
/// naturally, failed, or was cancelled.
pub struct StreamCallbacks<T, E = TransportError> {
    on_data: DataCallback<T>,
    on_error: Option<ErrorCallback<E>>,
    on_close: Option<CloseCallback>,
}

impl<T, E> StreamCallbacks<T, E> {
    /// Create callbacks with the required data handler.
    pub fn new(on_data: impl FnMut(T) + Send + 'static) -> Self {
        Self {
            on_data: Box::new(on_data),
            on_error: None,
            on_close: None,
        }
    }

    /// Set the error handler.
    pub fn on_error(mut self, on_error: impl FnOnce(E) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Set the close handler.
    pub fn on_close(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }

    /// Split into the individual callbacks.
    pub fn into_parts(
        self,
    ) -> (
        DataCallback<T>,
        Option<ErrorCallback<E>>,
        Option<CloseCallback>,
    ) {
        (self.on_data, self.on_error, self.on_close)
    }
}

impl<T, E> fmt::Debug for StreamCallbacks<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish_non_exhaustive()
    }
}

/// State shared between a handle and its read loop.
struct Shared {
    cancelled: AtomicBool,
    closed: AtomicBool,
    token: CancellationToken,
    done: CancellationToken,
    on_close: Mutex<Option<CloseCallback>>,
}

impl Shared {
    fn new(on_close: Option<CloseCallback>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            token: CancellationToken::new(),
            done: CancellationToken::new(),
            on_close: Mutex::new(on_close),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the close callback unless it already ran.
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self
            .on_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            callback();
        }
        self.done.cancel();
    }
}

/// Caller-held capability for a live stream.
///
/// Cloning shares the same stream. Dropping a handle does not cancel the
/// stream; call [`cancel`](Self::cancel) to stop it.
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<Shared>,
}

impl StreamHandle {
    fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Stop the stream.
    ///
    /// The first call aborts any in-flight read, closes the connection and
    /// runs `on_close`. Later calls do nothing.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Cancelling stream");
        self.shared.token.cancel();
        self.shared.close();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Whether `on_close` has already run.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Wait until the stream has closed, by cancellation or natural end.
    pub async fn closed(&self) {
        self.shared.done.cancelled().await;
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("cancelled", &self.is_cancelled())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// How body bytes are turned into data callbacks.
#[derive(Debug)]
pub(crate) enum BodyPipeline {
    /// Bytes are passed through as read.
    Plain,
    /// Bytes go through the incremental chunked decoder.
    Chunked {
        decoder: ChunkedDecoder,
        buffer: BytesMut,
    },
}

impl BodyPipeline {
    pub(crate) fn for_headers(headers: &Headers) -> Self {
        if headers.is_chunked() {
            Self::Chunked {
                decoder: ChunkedDecoder::new(),
                buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            }
        } else {
            Self::Plain
        }
    }

    pub(crate) fn feed(&mut self, data: &[u8], deliver: &mut dyn FnMut(Bytes)) {
        match self {
            Self::Plain => {
                if !data.is_empty() {
                    deliver(Bytes::copy_from_slice(data));
                }
            }
            Self::Chunked { decoder, buffer } => {
                buffer.extend_from_slice(data);
                loop {
                    match decoder.decode(buffer) {
                        Ok(Some(chunk)) => deliver(chunk),
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(error = %e, "Chunk decoding failed");
                            break;
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        match self {
            Self::Plain => false,
            Self::Chunked { decoder, .. } => decoder.is_finished(),
        }
    }
}

/// Start the background read loop for an established stream.
///
/// `initial` holds body bytes that arrived together with the headers; they
/// are delivered before the task starts reading.
pub(crate) fn start(
    conn: BoxedConnection,
    mut pipeline: BodyPipeline,
    initial: &[u8],
    callbacks: StreamCallbacks<Bytes>,
) -> StreamHandle {
    let (mut on_data, mut on_error, on_close) = callbacks.into_parts();
    let shared = Arc::new(Shared::new(on_close));

    if !initial.is_empty() {
        tracing::trace!(bytes = initial.len(), "Feeding initial remainder");
        pipeline.feed(initial, &mut |chunk: Bytes| on_data(chunk));
    }

    let guard = CloseOnDrop(Arc::clone(&shared));
    tokio::spawn(async move {
        let shared = Arc::clone(&guard.0);
        let mut conn = conn;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0usize;

        loop {
            if pipeline.is_finished() {
                tracing::debug!(bytes = total, "Chunked body complete");
                break;
            }

            let read = tokio::select! {
                biased;

                _ = shared.token.cancelled() => {
                    tracing::debug!(bytes = total, "Stream read aborted by cancellation");
                    break;
                }

                read = conn.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    tracing::debug!(bytes = total, "Stream reached EOF");
                    break;
                }
                Ok(n) => {
                    total += n;
                    tracing::trace!(bytes = n, "Stream data received");
                    pipeline.feed(&buf[..n], &mut |chunk: Bytes| {
                        if !shared.is_cancelled() {
                            on_data(chunk);
                        }
                    });
                }
                Err(e) => {
                    if shared.is_cancelled() {
                        tracing::debug!(error = %e, "Read failed after cancellation");
                    } else {
                        tracing::warn!(error = %e, "Stream read failed");
                        if let Some(callback) = on_error.take() {
                            callback(TransportError::Io(e));
                        }
                    }
                    break;
                }
            }
        }

        drop(conn);
        drop(guard);
    });

    StreamHandle::new(shared)
}

/// Runs the close path when the read loop ends, including by panic.
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancel_is_idempotent_and_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let shared = Arc::new(Shared::new(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))));
        let handle = StreamHandle::new(shared);

        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        handle.clone().cancel();

        assert!(handle.is_cancelled());
        assert!(handle.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_read_loop_still_closes() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let shared = Arc::new(Shared::new(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))));
        let handle = StreamHandle::new(Arc::clone(&shared));

        let guard = CloseOnDrop(shared);
        let task = tokio::spawn(async move {
            let _guard = guard;
            panic!("decoder bug");
        });
        assert!(task.await.is_err());

        tokio::time::timeout(std::time::Duration::from_secs(1), handle.closed())
            .await
            .unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_plain_pipeline_passes_bytes_through() {
        let mut pipeline = BodyPipeline::Plain;
        let mut out = Vec::new();
        pipeline.feed(b"abc", &mut |b: Bytes| out.push(b));
        pipeline.feed(b"", &mut |b: Bytes| out.push(b));
        assert_eq!(out, vec![Bytes::from_static(b"abc")]);
        assert!(!pipeline.is_finished());
    }

    #[test]
    fn test_chunked_pipeline_across_feeds() {
        let mut pipeline = BodyPipeline::Chunked {
            decoder: ChunkedDecoder::new(),
            buffer: BytesMut::new(),
        };
        let mut out = Vec::new();
        pipeline.feed(b"3\r\nab", &mut |b: Bytes| out.push(b));
        assert!(out.is_empty());
        pipeline.feed(b"c\r\n0\r\n\r\n", &mut |b: Bytes| out.push(b));
        assert_eq!(out, vec![Bytes::from_static(b"abc")]);
        assert!(pipeline.is_finished());
    }

    #[test]
    fn test_callbacks_debug() {
        let callbacks: StreamCallbacks<Bytes> = StreamCallbacks::new(|_| {}).on_close(|| {});
        let text = format!("{callbacks:?}");
        assert!(text.contains("on_close: true"));
        assert!(text.contains("on_error: false"));
    }
}
