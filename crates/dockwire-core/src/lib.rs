//! # dockwire-core
//!
//! Docker Engine API client built on [`dockwire_http`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      DockerClient                        │
//! │  list / inspect / start / stop / restart / remove        │
//! │  images, system df, logs, events                         │
//! └──────────────┬────────────────────────────┬──────────────┘
//!                │ one-shot                   │ streaming
//!                ▼                            ▼
//!        serde_json models          LogFrameDecoder / EventDecoder
//!                │                            │
//!                ▼                            ▼
//!       normalize + views            StreamCallbacks<LogLine | DockerEvent>
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use dockwire_core::{DockerClient, EventFilters, StreamCallbacks};
//!
//! # async fn example() -> dockwire_core::Result<()> {
//! let client = DockerClient::from_env();
//!
//! let details = client.container_details("web").await?;
//! println!("{} is {}", details.summary.name, details.summary.state);
//!
//! let handle = client
//!     .stream_events(
//!         &EventFilters::new().event_type("container"),
//!         StreamCallbacks::new(|event: dockwire_core::DockerEvent| {
//!             println!("{} {}", event.action, event.actor.id)
//!         }),
//!     )
//!     .await?;
//! handle.closed().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod events;
pub mod logs;
pub mod models;
pub mod normalize;
pub mod views;

pub use client::{DockerClient, RemoveOptions};
pub use config::{
    default_socket_path, ClientConfig, ConfigError, DEFAULT_LOG_TAIL, DEFAULT_SOCKET_PATH,
    FLATPAK_SOCKET_PATH,
};
pub use error::{ClientError, ErrorCause, Result};
pub use events::{decode_event_lines, DockerEvent, EventDecoder, EventFilters};
pub use logs::{decode_log_frames, LogFrameDecoder, LogLine, LogOptions, LogStream};
pub use normalize::{Container, ComposeInfo, Image};
pub use views::{ContainerDetails, DiskUsageSummary};

pub use dockwire_http::{StreamCallbacks, StreamHandle, Target, Transport, TransportError};
