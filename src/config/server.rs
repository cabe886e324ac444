// ABOUTME: The remote host used by tunneled mode.
// ABOUTME: Parses "host", "user@host", "host:port" and "user@host:port".

use crate::runtime::{RuntimeConfig, RuntimeType};
use crate::ssh::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    /// Runtime on the remote host; detected when absent.
    #[serde(default)]
    pub runtime: Option<RuntimeType>,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

impl RemoteConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("remote address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some(("", _)) => return Err("user cannot be empty".to_string()),
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(RemoteConfig {
            host: host.to_string(),
            port,
            user,
            runtime: None,
            socket: None,
            trust_first_connection: false,
            key_path: None,
        })
    }

    /// SSH parameters for reaching this host. A missing user falls back to `$USER`.
    pub fn session_config(&self, connect_timeout: Duration) -> SessionConfig {
        let user = self
            .user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()));

        let config = SessionConfig::new(&self.host, user)
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection)
            .connect_timeout(connect_timeout);

        match &self.key_path {
            Some(path) => config.key_path(path),
            None => config,
        }
    }

    /// Runtime overrides for detection on the remote host.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            runtime: self.runtime,
            socket: self.socket.clone(),
        }
    }
}
