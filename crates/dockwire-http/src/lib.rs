//! # dockwire-http
//!
//! A deliberately small HTTP/1.1 client for talking to the Docker Engine API
//! over a Unix domain socket (or plain TCP). It does its own request framing
//! and response parsing on raw bytes instead of depending on an HTTP stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Transport                            │
//! │   request()                    request_stream()            │
//! │      │                              │                      │
//! │      ▼                              ▼                      │
//! │  write request                write request (keep-alive)   │
//! │  read to EOF                  read until CRLFCRLF          │
//! │  parse_response()             validate status              │
//! │      │                              │                      │
//! │      ▼                              ▼                      │
//! │  decode_chunked()             spawned read loop            │
//! │                                 ├─ passthrough             │
//! │                                 └─ ChunkedDecoder          │
//! │                                      │                     │
//! │                                      ▼                     │
//! │                               on_data / on_error / on_close│
//! └────────────────────────────────────────────────────────────┘
//!                            │ Connector
//!                            ▼
//!               UnixStream / TcpStream (one per request)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use dockwire_http::{Bytes, StreamCallbacks, Target, Transport};
//!
//! # async fn example() -> dockwire_http::Result<()> {
//! let transport = Transport::new(Target::unix("/var/run/docker.sock"));
//!
//! // Buffered request
//! let body = transport.request_bytes("GET", "/containers/json", None).await?;
//! println!("{}", String::from_utf8_lossy(&body));
//!
//! // Streaming request
//! let handle = transport
//!     .request_stream(
//!         "GET",
//!         "/events",
//!         None,
//!         StreamCallbacks::new(|chunk: Bytes| println!("{} bytes", chunk.len()))
//!             .on_close(|| println!("closed")),
//!     )
//!     .await?;
//! handle.cancel();
//! # Ok(())
//! # }
//! ```

mod chunked;
mod error;
mod request;
mod response;
mod stream;
mod target;
mod transport;

pub use bytes::Bytes;
pub use chunked::{decode_chunked, ChunkedDecoder, MAX_CHUNK_LEN};
pub use error::{Result, TransportError};
pub use request::{Request, USER_AGENT};
pub use response::{find_header_end, parse_response, Headers, Response, ResponseHead};
pub use stream::{CloseCallback, DataCallback, ErrorCallback, StreamCallbacks, StreamHandle};
pub use target::{BoxedConnection, Connection, Connector, Target, TargetConnector};
pub use transport::Transport;
