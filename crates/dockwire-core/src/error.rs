//! Error types for dockwire-core.

use dockwire_http::TransportError;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Underlying reason an operation failed.
#[derive(Debug, Error)]
pub enum ErrorCause {
    /// Transport-level failure (connection, framing, HTTP status)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response body was not the expected JSON
    #[error("invalid JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by [`DockerClient`](crate::DockerClient).
///
/// Every failure carries the operation it happened in, so callers never see
/// a bare transport error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An API operation failed.
    #[error("Failed to {verb} {resource}{}: {cause}", id_suffix(.id))]
    Operation {
        /// Action attempted, e.g. `inspect`
        verb: &'static str,
        /// Kind of object, e.g. `container`
        resource: &'static str,
        /// Object identifier; empty for collection operations
        id: String,
        /// What went wrong
        #[source]
        cause: ErrorCause,
    },
}

fn id_suffix(id: &str) -> String {
    if id.is_empty() {
        String::new()
    } else {
        format!(" {id}")
    }
}

impl ClientError {
    pub(crate) fn operation(
        verb: &'static str,
        resource: &'static str,
        id: impl Into<String>,
        cause: impl Into<ErrorCause>,
    ) -> Self {
        Self::Operation {
            verb,
            resource,
            id: id.into(),
            cause: cause.into(),
        }
    }

    /// The underlying cause.
    pub fn cause(&self) -> &ErrorCause {
        match self {
            Self::Operation { cause, .. } => cause,
        }
    }

    /// HTTP status returned by the daemon, if the failure was an HTTP error.
    pub fn status_code(&self) -> Option<u16> {
        match self.cause() {
            ErrorCause::Transport(e) => e.status_code(),
            ErrorCause::Json(_) => None,
        }
    }

    /// Whether the daemon answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}
