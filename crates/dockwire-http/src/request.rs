//! HTTP/1.1 request serialization.

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("dockwire/", env!("CARGO_PKG_VERSION"));

/// A single API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method (`GET`, `POST`, `DELETE`, ...).
    pub method: String,
    /// Path plus query string, e.g. `/containers/json?all=true`.
    pub path: String,
    /// Optional JSON body.
    pub body: Option<String>,
}

impl Request {
    /// Create a request without a body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize the request into wire bytes.
    ///
    /// One-shot requests ask the daemon to close the connection after the
    /// response (`keep_alive = false`); streaming requests leave it open.
    pub fn encode(&self, host: &str, keep_alive: bool) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: application/json\r\n",
            self.method, self.path, host, USER_AGENT
        );

        if let Some(body) = &self.body {
            head.push_str("Content-Type: application/json\r\n");
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }

        if !keep_alive {
            head.push_str("Connection: close\r\n");
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body.as_bytes());
        }
        bytes
    }
}
