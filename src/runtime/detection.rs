// ABOUTME: Finds the container runtime socket on the local or a remote host.
// ABOUTME: Order: rootless Podman, rootful Podman, Docker; overrides win.

use super::types::{DOCKER_SOCKET, ROOTFUL_PODMAN_SOCKET, RuntimeConfig, RuntimeInfo, RuntimeType};
use crate::ssh::Session;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured socket does not exist: {0}")]
    SocketMissing(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] crate::ssh::Error),
}

fn rootless_podman_socket(uid: &str) -> String {
    format!("/run/user/{}/podman/podman.sock", uid)
}

/// Guess the runtime behind a socket path given without a runtime type.
fn runtime_for_socket(socket: &str) -> RuntimeType {
    if socket.contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

/// Detect the runtime on this machine.
pub fn detect_local(config: Option<&RuntimeConfig>) -> Result<RuntimeInfo, DetectionError> {
    if let Some(cfg) = config {
        if let Some(info) = cfg.forced() {
            return Ok(info);
        }
        if let Some(socket) = &cfg.socket {
            if !Path::new(socket).exists() {
                return Err(DetectionError::SocketMissing(socket.clone()));
            }
            return Ok(RuntimeInfo {
                runtime_type: runtime_for_socket(socket),
                socket_path: socket.clone(),
            });
        }
    }

    if let Some(uid) = local_uid() {
        let socket = rootless_podman_socket(&uid);
        if Path::new(&socket).exists() {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: socket,
            });
        }
    }

    [
        (RuntimeType::Podman, ROOTFUL_PODMAN_SOCKET),
        (RuntimeType::Docker, DOCKER_SOCKET),
    ]
    .into_iter()
    .find(|(_, socket)| Path::new(socket).exists())
    .map(|(runtime_type, socket)| RuntimeInfo {
        runtime_type,
        socket_path: socket.to_string(),
    })
    .ok_or(DetectionError::NoRuntimeFound)
}

fn local_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()?
            .lines()
            .find(|l| l.starts_with("Uid:"))?
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
    })
}

/// Detect the runtime on the host at the other end of `session`.
pub async fn detect_remote(
    session: &Session,
    config: Option<&RuntimeConfig>,
) -> Result<RuntimeInfo, DetectionError> {
    if let Some(cfg) = config {
        if let Some(info) = cfg.forced() {
            return Ok(info);
        }
        if let Some(socket) = &cfg.socket {
            if !session.file_exists(socket).await? {
                return Err(DetectionError::SocketMissing(socket.clone()));
            }
            return Ok(RuntimeInfo {
                runtime_type: runtime_for_socket(socket),
                socket_path: socket.clone(),
            });
        }
    }

    let uid_output = session.exec("id -u").await?;
    if uid_output.success() {
        let socket = rootless_podman_socket(uid_output.stdout.trim());
        if session.file_exists(&socket).await? {
            return Ok(RuntimeInfo {
                runtime_type: RuntimeType::Podman,
                socket_path: socket,
            });
        }
    }

    for (runtime_type, socket) in [
        (RuntimeType::Podman, ROOTFUL_PODMAN_SOCKET),
        (RuntimeType::Docker, DOCKER_SOCKET),
    ] {
        if session.file_exists(socket).await? {
            return Ok(RuntimeInfo {
                runtime_type,
                socket_path: socket.to_string(),
            });
        }
    }

    Err(DetectionError::NoRuntimeFound)
}
