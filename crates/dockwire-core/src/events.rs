//! Docker event feed decoding.
//!
//! `/events` is newline-delimited JSON. Lines that fail to parse are logged
//! and dropped so one bad record never ends a long-lived feed.

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio_util::codec::Decoder;

/// Object that triggered an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventActor {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
}

/// Wire shape of an event, including the pre-1.22 top-level fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "Action")]
    action: Option<String>,
    #[serde(rename = "Actor")]
    actor: Option<EventActor>,
    scope: Option<String>,
    time: i64,
    #[serde(rename = "timeNano")]
    time_nano: i64,
    status: Option<String>,
    id: Option<String>,
    from: Option<String>,
}

/// A single daemon event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEvent")]
pub struct DockerEvent {
    /// Object type (`container`, `image`, `network`, ...).
    pub kind: String,
    /// What happened (`start`, `die`, `pull`, ...).
    pub action: String,
    pub actor: EventActor,
    /// `local` or `swarm`.
    pub scope: Option<String>,
    /// Seconds since the epoch.
    pub time: i64,
    /// Nanoseconds since the epoch.
    pub time_nano: i64,
}

impl From<RawEvent> for DockerEvent {
    fn from(raw: RawEvent) -> Self {
        let mut actor = raw.actor.unwrap_or_default();
        if actor.id.is_empty() {
            actor.id = raw.id.unwrap_or_default();
        }
        if let Some(from) = raw.from {
            actor.attributes.entry("image".to_string()).or_insert(from);
        }

        Self {
            kind: raw.kind.unwrap_or_default(),
            action: raw.action.or(raw.status).unwrap_or_default(),
            actor,
            scope: raw.scope,
            time: raw.time,
            time_nano: raw.time_nano,
        }
    }
}

impl DockerEvent {
    /// Parse a single JSON line.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Event time, preferring nanosecond precision when present.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if self.time_nano > 0 {
            Some(DateTime::from_timestamp_nanos(self.time_nano))
        } else {
            DateTime::from_timestamp(self.time, 0)
        }
    }

    /// The actor's `name` attribute, if any.
    pub fn actor_name(&self) -> Option<&str> {
        self.actor.attributes.get("name").map(String::as_str)
    }
}

fn parse_line(line: &str) -> Option<DockerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match DockerEvent::parse(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, line = %line, "Dropping malformed event line");
            None
        }
    }
}

/// Split accumulated text into events and the unterminated remainder.
///
/// Everything after the last newline (possibly empty) is returned as the
/// remainder to prepend to the next arrival.
pub fn decode_event_lines(buffer: &str) -> (Vec<DockerEvent>, String) {
    let (complete, remainder) = match buffer.rfind('\n') {
        Some(pos) => (&buffer[..pos], &buffer[pos + 1..]),
        None => ("", buffer),
    };
    let events = complete.split('\n').filter_map(parse_line).collect();
    (events, remainder.to_string())
}

/// Incremental decoder for the event feed.
#[derive(Debug, Default)]
pub struct EventDecoder {
    dropped: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-blank lines that failed to parse.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn take_line(&mut self, line: &[u8]) -> Option<DockerEvent> {
        let text = String::from_utf8_lossy(line);
        if text.trim().is_empty() {
            return None;
        }
        let event = parse_line(&text);
        if event.is_none() {
            self.dropped += 1;
        }
        event
    }
}

impl Decoder for EventDecoder {
    type Item = DockerEvent;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DockerEvent>, Self::Error> {
        while let Some(newline) = src.iter().position(|b| *b == b'\n') {
            let line = src.split_to(newline + 1);
            if let Some(event) = self.take_line(&line[..newline]) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<DockerEvent>, Self::Error> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        let rest = src.split();
        Ok(self.take_line(&rest))
    }
}

/// Filters for the event feed.
///
/// Serialized as a JSON object with sorted keys, e.g.
/// `{"container":["abc"],"type":["container"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventFilters(BTreeMap<String, Vec<String>>);

impl EventFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for an arbitrary filter key.
    pub fn add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn container(self, id: impl Into<String>) -> Self {
        self.add("container", id)
    }

    pub fn event_type(self, kind: impl Into<String>) -> Self {
        self.add("type", kind)
    }

    pub fn event(self, action: impl Into<String>) -> Self {
        self.add("event", action)
    }

    pub fn image(self, image: impl Into<String>) -> Self {
        self.add("image", image)
    }

    pub fn label(self, label: impl Into<String>) -> Self {
        self.add("label", label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON form of the filters.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Request path for `/events` with these filters applied.
    pub fn to_path(&self) -> String {
        if self.is_empty() {
            "/events".to_string()
        } else {
            format!("/events?filters={}", urlencoding::encode(&self.to_json()))
        }
    }
}
