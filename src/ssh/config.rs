// ABOUTME: Connection parameters for an SSH session.
// ABOUTME: Builder methods plus parsing of `user@host:port` targets.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 22;

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key to authenticate with. Without one the agent is tried,
    /// then the usual files under `~/.ssh`.
    pub key_path: Option<PathBuf>,
    /// Accept and remember host keys missing from known_hosts.
    pub trust_on_first_use: bool,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            key_path: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }

    /// Parse `[user@]host[:port]`. A missing user falls back to `$USER`, then `root`.
    pub fn from_target(target: &str) -> Option<Self> {
        let (user, rest) = match target.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
            Some(_) => return None,
            None => (
                std::env::var("USER").unwrap_or_else(|_| "root".to_string()),
                target,
            ),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (rest, DEFAULT_PORT),
        };

        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, user).port(port))
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}
