//! Client configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults.

use crate::logs::DEFAULT_MAX_FRAME_LEN;
use dockwire_http::Target;
use std::path::{Path, PathBuf};

/// Docker socket on a regular host.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Host socket as seen from inside a Flatpak sandbox.
pub const FLATPAK_SOCKET_PATH: &str = "/run/host/run/docker.sock";

/// Default number of log lines requested (`all`).
pub const DEFAULT_LOG_TAIL: &str = "all";

/// Configuration for a [`DockerClient`](crate::DockerClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Daemon endpoint.
    pub target: Target,

    /// Largest multiplexed log frame accepted before falling back to raw text.
    pub max_frame_len: usize,

    /// Default `tail` value for log requests.
    pub log_tail: String,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("docker socket not found: {0}")]
    MissingSocket(PathBuf),

    #[error("max frame length must be greater than zero")]
    ZeroFrameLimit,

    #[error("invalid log tail {0:?} (expected \"all\" or a number)")]
    InvalidTail(String),
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: Target::unix(default_socket_path()),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            log_tail: DEFAULT_LOG_TAIL.to_string(),
        }
    }
}

/// Whether we are running inside a Flatpak sandbox.
fn in_flatpak() -> bool {
    std::env::var_os("FLATPAK_ID").is_some() || Path::new("/.flatpak-info").exists()
}

/// Platform default socket path.
pub fn default_socket_path() -> PathBuf {
    socket_path_for(in_flatpak())
}

fn socket_path_for(sandboxed: bool) -> PathBuf {
    if sandboxed {
        PathBuf::from(FLATPAK_SOCKET_PATH)
    } else {
        PathBuf::from(DEFAULT_SOCKET_PATH)
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DOCKWIRE_HOST` | `DOCKER_HOST`, then the platform socket |
    /// | `DOCKWIRE_MAX_FRAME_LEN` | `1000000` |
    /// | `DOCKWIRE_LOG_TAIL` | `all` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        let target = lookup("DOCKWIRE_HOST")
            .or_else(|| lookup("DOCKER_HOST"))
            .filter(|v| !v.trim().is_empty())
            .map(|v| Target::parse(&v))
            .unwrap_or(default.target);

        Self {
            target,
            max_frame_len: lookup("DOCKWIRE_MAX_FRAME_LEN")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_frame_len),
            log_tail: lookup("DOCKWIRE_LOG_TAIL").unwrap_or(default.log_tail),
        }
    }

    /// Set the daemon endpoint.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Validate the configuration.
    ///
    /// Call this at startup to get clear error messages about a missing
    /// socket before the first request fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Target::Unix(path) = &self.target {
            if !path.exists() {
                return Err(ConfigError::MissingSocket(path.clone()));
            }
        }

        if self.max_frame_len == 0 {
            return Err(ConfigError::ZeroFrameLimit);
        }

        if !valid_tail(&self.log_tail) {
            return Err(ConfigError::InvalidTail(self.log_tail.clone()));
        }

        Ok(())
    }

    /// Validate configuration but only log warnings instead of failing.
    pub fn validate_warn(&self) {
        if let Err(e) = self.validate() {
            tracing::warn!(target_addr = %self.target, error = %e, "Configuration problem");
        }
    }
}

fn valid_tail(tail: &str) -> bool {
    tail == "all" || tail.parse::<u64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_socket_path_selection() {
        assert_eq!(socket_path_for(false), PathBuf::from("/var/run/docker.sock"));
        assert_eq!(
            socket_path_for(true),
            PathBuf::from("/run/host/run/docker.sock")
        );
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.max_frame_len, 1_000_000);
        assert_eq!(config.log_tail, "all");
        assert!(matches!(config.target, Target::Unix(_)));
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_falls_back_to_docker_host() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("DOCKER_HOST", "tcp://10.0.0.5:2375"),
            ("DOCKWIRE_MAX_FRAME_LEN", "4096"),
        ]));
        assert_eq!(config.target, Target::Tcp("10.0.0.5:2375".into()));
        assert_eq!(config.max_frame_len, 4096);
        assert_eq!(config.log_tail, "all");
    }

    #[test]
    fn test_from_lookup_prefers_dockwire_host() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("DOCKWIRE_HOST", "unix:///tmp/custom.sock"),
            ("DOCKER_HOST", "tcp://10.0.0.5:2375"),
            ("DOCKWIRE_MAX_FRAME_LEN", "not-a-number"),
            ("DOCKWIRE_LOG_TAIL", "100"),
        ]));
        assert_eq!(config.target, Target::unix("/tmp/custom.sock"));
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
        assert_eq!(config.log_tail, "100");
    }

    #[test]
    fn test_from_lookup_ignores_blank_host() {
        let config = ClientConfig::from_lookup(lookup(&[("DOCKWIRE_HOST", "  ")]));
        assert_eq!(config.target, ClientConfig::default().target);
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");

        let config = ClientConfig::default().with_target(Target::unix(&socket));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSocket(p)) if p == socket
        ));

        std::fs::write(&socket, b"").unwrap();
        assert!(config.validate().is_ok());

        let zero = ClientConfig {
            max_frame_len: 0,
            ..config.clone()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::ZeroFrameLimit)));

        let bad_tail = ClientConfig {
            log_tail: "ten".into(),
            ..config.clone()
        };
        assert!(matches!(bad_tail.validate(), Err(ConfigError::InvalidTail(_))));

        let tcp = ClientConfig::default().with_target(Target::Tcp("localhost:2375".into()));
        assert!(tcp.validate().is_ok());
    }
}
