// ABOUTME: Runtime kinds (Docker, Podman) and where their API sockets live.
// ABOUTME: RuntimeInfo is the outcome of detection; RuntimeConfig overrides it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub(crate) const ROOTFUL_PODMAN_SOCKET: &str = "/run/podman/podman.sock";
pub(crate) const DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    /// Socket used when nothing more specific is known.
    pub fn default_socket(&self) -> &'static str {
        match self {
            RuntimeType::Docker => DOCKER_SOCKET,
            RuntimeType::Podman => ROOTFUL_PODMAN_SOCKET,
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "docker"),
            RuntimeType::Podman => write!(f, "podman"),
        }
    }
}

impl FromStr for RuntimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(RuntimeType::Docker),
            "podman" => Ok(RuntimeType::Podman),
            other => Err(format!("unknown runtime: {other}")),
        }
    }
}

/// A runtime found on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub runtime_type: RuntimeType,
    /// Path of the API socket on that host.
    pub socket_path: String,
}

/// Explicit runtime selection that bypasses detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuntimeConfig {
    pub runtime: Option<RuntimeType>,
    pub socket: Option<String>,
}

impl RuntimeConfig {
    /// The forced runtime, if the override names one.
    pub fn forced(&self) -> Option<RuntimeInfo> {
        let runtime_type = self.runtime?;
        Some(RuntimeInfo {
            runtime_type,
            socket_path: self
                .socket
                .clone()
                .unwrap_or_else(|| runtime_type.default_socket().to_string()),
        })
    }
}
