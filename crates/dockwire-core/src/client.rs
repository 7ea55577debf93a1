//! Docker Engine API client.
//!
//! Every operation opens its own connection through [`Transport`], decodes
//! the reply and wraps any failure with the operation it belongs to.

use crate::config::ClientConfig;
use crate::error::{ClientError, ErrorCause, Result};
use crate::events::{DockerEvent, EventDecoder, EventFilters};
use crate::logs::{decode_log_frames, is_multiplexed, LogFrameDecoder, LogLine, LogOptions};
use crate::models::{
    ContainerInspect, ContainerSummary, ImageDeleteItem, ImageInspect, ImageSummary, SystemDf,
};
use crate::normalize::{image_rows, Container, Image};
use crate::views::ContainerDetails;
use bytes::{Bytes, BytesMut};
use dockwire_http::{
    DataCallback, StreamCallbacks, StreamHandle, Target, Transport, TransportError,
};
use serde::de::DeserializeOwned;
use std::fmt;
use tokio_util::codec::Decoder;

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Also remove anonymous volumes.
    pub volumes: bool,
}

/// Context attached to every failure of one API call.
#[derive(Debug, Clone)]
struct Operation {
    verb: &'static str,
    resource: &'static str,
    id: String,
}

impl Operation {
    fn new(verb: &'static str, resource: &'static str, id: impl Into<String>) -> Self {
        Self {
            verb,
            resource,
            id: id.into(),
        }
    }

    fn fail(&self, cause: impl Into<ErrorCause>) -> ClientError {
        let cause = cause.into();
        tracing::debug!(
            verb = self.verb,
            resource = self.resource,
            id = %self.id,
            error = %cause,
            "Operation failed"
        );
        ClientError::operation(self.verb, self.resource, self.id.clone(), cause)
    }
}

/// Feeds raw stream bytes through a codec and hands out decoded items.
struct DecodeSink<D: Decoder> {
    decoder: D,
    buffer: BytesMut,
    on_item: DataCallback<D::Item>,
}

impl<D> DecodeSink<D>
where
    D: Decoder,
    D::Error: fmt::Display,
{
    fn new(decoder: D, on_item: DataCallback<D::Item>) -> Self {
        Self {
            decoder,
            buffer: BytesMut::new(),
            on_item,
        }
    }

    fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        loop {
            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(item)) => (self.on_item)(item),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Stream decoding failed, discarding buffer");
                    self.buffer.clear();
                    break;
                }
            }
        }
    }
}

/// Flatten a one-shot log body; TTY containers send plain text.
fn flatten_logs(body: &[u8]) -> String {
    match body.first() {
        Some(first) if is_multiplexed(*first) => decode_log_frames(body),
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Client for the Docker Engine API.
///
/// # Example
///
/// ```no_run
/// use dockwire_core::DockerClient;
///
/// # async fn example() -> dockwire_core::Result<()> {
/// let client = DockerClient::from_env();
/// for container in client.list_containers(true).await? {
///     println!("{} {} {}", container.short_id, container.name, container.status);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DockerClient {
    transport: Transport,
    max_frame_len: usize,
    log_tail: String,
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl DockerClient {
    /// Create a client for the given daemon endpoint.
    pub fn new(target: Target) -> Self {
        Self::from_config(&ClientConfig::default().with_target(target))
    }

    /// Create a client from configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            transport: Transport::new(config.target.clone()),
            max_frame_len: config.max_frame_len,
            log_tail: config.log_tail.clone(),
        }
    }

    /// Create a client configured from the environment.
    pub fn from_env() -> Self {
        Self::from_config(&ClientConfig::from_env())
    }

    /// Create a client over an existing transport.
    pub fn with_transport(transport: Transport) -> Self {
        let defaults = ClientConfig::default();
        Self {
            transport,
            max_frame_len: defaults.max_frame_len,
            log_tail: defaults.log_tail,
        }
    }

    /// Set the multiplexed frame length limit used by log streams.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Point subsequent requests at a different daemon.
    pub fn set_target(&mut self, target: Target) {
        self.transport.set_target(target);
    }

    /// Log options carrying the configured default tail.
    pub fn log_options(&self) -> LogOptions {
        LogOptions::default().tail(self.log_tail.clone())
    }

    async fn call(&self, op: &Operation, method: &str, path: &str) -> Result<Bytes> {
        self.transport
            .request_bytes(method, path, None)
            .await
            .map_err(|e| op.fail(e))
    }

    async fn get_json<T: DeserializeOwned>(&self, op: &Operation, path: &str) -> Result<T> {
        let body = self.call(op, "GET", path).await?;
        serde_json::from_slice(&body).map_err(|e| op.fail(e))
    }

    /// POST a lifecycle action. 304 means the container is already in the
    /// requested state.
    async fn lifecycle(&self, op: &Operation, path: &str) -> Result<()> {
        match self.transport.request("POST", path, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.status_code() == Some(304) => {
                tracing::debug!(verb = op.verb, id = %op.id, "Container already in requested state");
                Ok(())
            }
            Err(e) => Err(op.fail(e)),
        }
    }

    async fn stream_decoded<D>(
        &self,
        op: Operation,
        path: &str,
        decoder: D,
        callbacks: StreamCallbacks<D::Item, ClientError>,
    ) -> Result<StreamHandle>
    where
        D: Decoder + Send + 'static,
        D::Item: Send + 'static,
        D::Error: fmt::Display,
    {
        let (on_item, on_error, on_close) = callbacks.into_parts();
        let mut sink = DecodeSink::new(decoder, on_item);

        let mut raw = StreamCallbacks::new(move |chunk: Bytes| sink.push(&chunk));
        if let Some(on_error) = on_error {
            let op = op.clone();
            raw = raw.on_error(move |e: TransportError| on_error(op.fail(e)));
        }
        if let Some(on_close) = on_close {
            raw = raw.on_close(on_close);
        }

        self.transport
            .request_stream("GET", path, None, raw)
            .await
            .map_err(|e| op.fail(e))
    }

    // =========================================================================
    // Containers
    // =========================================================================

    /// List containers; `all` includes stopped ones.
    pub async fn list_containers(&self, all: bool) -> Result<Vec<Container>> {
        let op = Operation::new("list", "containers", "");
        let raw: Vec<ContainerSummary> = self
            .get_json(&op, &format!("/containers/json?all={all}"))
            .await?;
        tracing::debug!(count = raw.len(), "Listed containers");
        Ok(raw.into_iter().map(Container::from).collect())
    }

    /// Inspect a container by ID or name.
    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        let op = Operation::new("inspect", "container", id);
        self.get_json(&op, &format!("/containers/{}/json", id))
            .await
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        let op = Operation::new("start", "container", id);
        self.lifecycle(&op, &format!("/containers/{}/start", id))
            .await
    }

    /// Stop a container, waiting `timeout` seconds before killing it.
    pub async fn stop_container(&self, id: &str, timeout: Option<u32>) -> Result<()> {
        let op = Operation::new("stop", "container", id);
        let mut path = format!("/containers/{}/stop", id);
        if let Some(t) = timeout {
            path.push_str(&format!("?t={t}"));
        }
        self.lifecycle(&op, &path).await
    }

    /// Restart a container, waiting `timeout` seconds before killing it.
    pub async fn restart_container(&self, id: &str, timeout: Option<u32>) -> Result<()> {
        let op = Operation::new("restart", "container", id);
        let mut path = format!("/containers/{}/restart", id);
        if let Some(t) = timeout {
            path.push_str(&format!("?t={t}"));
        }
        self.lifecycle(&op, &path).await
    }

    pub async fn remove_container(&self, id: &str, options: RemoveOptions) -> Result<()> {
        let op = Operation::new("remove", "container", id);
        let path = format!(
            "/containers/{}?force={}&v={}",
            id,
            options.force,
            options.volumes
        );
        self.call(&op, "DELETE", &path).await?;
        Ok(())
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// List images, one row per tag; `all` includes intermediate layers.
    pub async fn list_images(&self, all: bool) -> Result<Vec<Image>> {
        let op = Operation::new("list", "images", "");
        let raw: Vec<ImageSummary> = self
            .get_json(&op, &format!("/images/json?all={all}"))
            .await?;
        tracing::debug!(count = raw.len(), "Listed images");
        Ok(raw.iter().flat_map(image_rows).collect())
    }

    pub async fn inspect_image(&self, id: &str) -> Result<ImageInspect> {
        let op = Operation::new("inspect", "image", id);
        self.get_json(&op, &format!("/images/{}/json", id))
            .await
    }

    /// Remove an image, returning what was untagged and deleted.
    pub async fn remove_image(
        &self,
        id: &str,
        force: bool,
        no_prune: bool,
    ) -> Result<Vec<ImageDeleteItem>> {
        let op = Operation::new("remove", "image", id);
        let path = format!(
            "/images/{}?force={force}&noprune={no_prune}",
            id
        );
        let body = self.call(&op, "DELETE", &path).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&body).map_err(|e| op.fail(e))
    }

    // =========================================================================
    // System
    // =========================================================================

    /// Disk usage across images, containers, volumes and build cache.
    pub async fn disk_usage(&self) -> Result<SystemDf> {
        let op = Operation::new("get", "disk usage", "");
        self.get_json(&op, "/system/df").await
    }

    /// Inspect a container and build all of its detail views.
    pub async fn container_details(&self, id: &str) -> Result<ContainerDetails> {
        let inspect = self.inspect_container(id).await?;
        let df = self.disk_usage().await?;
        Ok(ContainerDetails::build(&inspect, &df))
    }

    // =========================================================================
    // Logs and events
    // =========================================================================

    /// Fetch a snapshot of a container's logs as flat text.
    ///
    /// `follow` in `options` is ignored.
    pub async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<String> {
        let op = Operation::new("get", "logs for container", id);
        let options = LogOptions {
            follow: false,
            ..options.clone()
        };
        let path = format!("/containers/{}/logs?{}", id, options.to_query());
        let body = self.call(&op, "GET", &path).await?;
        Ok(flatten_logs(&body))
    }

    /// Follow a container's logs, one callback per line.
    ///
    /// # Errors
    ///
    /// Fails if the stream cannot be established; later failures go to the
    /// `on_error` callback.
    pub async fn stream_container_logs(
        &self,
        id: &str,
        options: &LogOptions,
        callbacks: StreamCallbacks<LogLine, ClientError>,
    ) -> Result<StreamHandle> {
        let op = Operation::new("stream", "logs for container", id);
        let options = LogOptions {
            follow: true,
            ..options.clone()
        };
        let path = format!("/containers/{}/logs?{}", id, options.to_query());
        let decoder = LogFrameDecoder::with_max_frame_len(self.max_frame_len);
        self.stream_decoded(op, &path, decoder, callbacks).await
    }

    /// Subscribe to daemon events matching `filters`.
    ///
    /// # Errors
    ///
    /// Fails if the stream cannot be established; later failures go to the
    /// `on_error` callback.
    pub async fn stream_events(
        &self,
        filters: &EventFilters,
        callbacks: StreamCallbacks<DockerEvent, ClientError>,
    ) -> Result<StreamHandle> {
        let op = Operation::new("stream", "events", "");
        self.stream_decoded(op, &filters.to_path(), EventDecoder::new(), callbacks)
            .await
    }
}
