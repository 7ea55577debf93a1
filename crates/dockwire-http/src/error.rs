//! Error types for dockwire-http.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while talking HTTP to the daemon.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("cannot connect to {target}: {source}")]
    Connection {
        /// Human-readable connection target (socket path or host:port).
        target: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The connection reached EOF before the response headers were complete.
    #[error("connection closed before response headers were received")]
    PrematureClose,

    /// The response could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The daemon answered with a status outside 2xx.
    #[error("HTTP {code}: {body}")]
    Http {
        /// HTTP status code
        code: u16,
        /// Response body decoded as text
        body: String,
    },

    /// I/O error after the connection was established
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}
