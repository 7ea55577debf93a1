//! Connection targets and the connector seam.
//!
//! A [`Connector`] opens one fresh byte stream per request. The default
//! [`TargetConnector`] dials a Unix socket or a TCP `host:port`; tests and
//! embedders can supply their own implementation to inject canned responses.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

/// A bidirectional byte stream to the daemon.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// Boxed connection returned by connectors.
pub type BoxedConnection = Box<dyn Connection>;

/// Where the daemon lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// Remote `host:port` reached over plain TCP.
    Tcp(String),
}

impl Target {
    /// Parse a target string.
    ///
    /// Accepted forms: `unix:///path`, `tcp://host:port`, `http://host:port`,
    /// an absolute or relative path, or a bare `host:port`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            return Self::Unix(PathBuf::from(path));
        }
        if let Some(addr) = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("http://"))
        {
            return Self::Tcp(addr.trim_end_matches('/').to_string());
        }
        if s.starts_with('/') || s.starts_with('.') {
            return Self::Unix(PathBuf::from(s));
        }
        match s.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Self::Tcp(s.to_string())
            }
            _ => Self::Unix(PathBuf::from(s)),
        }
    }

    /// Construct a Unix socket target.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::Unix(path.as_ref().to_path_buf())
    }

    /// Value for the `Host` request header.
    pub fn host_header(&self) -> String {
        match self {
            Self::Unix(_) => "localhost".to_string(),
            Self::Tcp(addr) => addr.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Opens connections to the daemon.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Open a new connection. Called once per request.
    async fn connect(&self) -> Result<BoxedConnection>;

    /// Value for the `Host` header of requests sent over this connector.
    fn host(&self) -> String {
        "localhost".to_string()
    }
}

/// Connector that dials a [`Target`] directly.
#[derive(Debug, Clone)]
pub struct TargetConnector {
    target: Target,
}

impl TargetConnector {
    /// Create a connector for the given target.
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    /// The target this connector dials.
    pub fn target(&self) -> &Target {
        &self.target
    }
}

#[async_trait]
impl Connector for TargetConnector {
    async fn connect(&self) -> Result<BoxedConnection> {
        tracing::trace!(target_addr = %self.target, "Opening connection");
        let conn: BoxedConnection = match &self.target {
            Target::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(connection_error(&path.display().to_string()))?;
                Box::new(stream)
            }
            Target::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(connection_error(addr))?;
                stream.set_nodelay(true).map_err(connection_error(addr))?;
                Box::new(stream)
            }
        };
        Ok(conn)
    }

    fn host(&self) -> String {
        self.target.host_header()
    }
}

/// Any failure while opening a socket is reported as a connection error.
fn connection_error(target: &str) -> impl FnOnce(std::io::Error) -> TransportError {
    let target = target.to_string();
    move |source| TransportError::Connection { target, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_setup_failure_is_connection_error() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad option");
        let err = connection_error("127.0.0.1:2375")(source);
        match err {
            TransportError::Connection { target, .. } => assert_eq!(target, "127.0.0.1:2375"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unix_forms() {
        assert_eq!(
            Target::parse("unix:///var/run/docker.sock"),
            Target::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert_eq!(
            Target::parse("/run/docker.sock"),
            Target::Unix(PathBuf::from("/run/docker.sock"))
        );
        assert_eq!(
            Target::parse("./docker.sock"),
            Target::Unix(PathBuf::from("./docker.sock"))
        );
    }

    #[test]
    fn test_parse_tcp_forms() {
        assert_eq!(
            Target::parse("tcp://10.0.0.5:2375"),
            Target::Tcp("10.0.0.5:2375".to_string())
        );
        assert_eq!(
            Target::parse("http://docker.local:2375/"),
            Target::Tcp("docker.local:2375".to_string())
        );
        assert_eq!(
            Target::parse("docker.local:2375"),
            Target::Tcp("docker.local:2375".to_string())
        );
    }

    #[test]
    fn test_host_header() {
        assert_eq!(Target::unix("/x.sock").host_header(), "localhost");
        assert_eq!(Target::Tcp("h:1".into()).host_header(), "h:1");
    }

    #[test]
    fn test_display() {
        assert_eq!(Target::unix("/x.sock").to_string(), "unix:///x.sock");
        assert_eq!(Target::Tcp("h:1".into()).to_string(), "tcp://h:1");
    }

    #[tokio::test]
    async fn test_connect_missing_socket_fails() {
        let connector = TargetConnector::new(Target::unix("/nonexistent/dockwire-test.sock"));
        let err = connector.connect().await.err().expect("connect should fail");
        assert!(matches!(err, TransportError::Connection { .. }));
    }
}
