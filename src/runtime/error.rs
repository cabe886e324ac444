// ABOUTME: Runtime error types with SNAFU pattern.
// ABOUTME: Unifies detection, tunnel and connection failures for programmatic handling.

use snafu::Snafu;

use super::detection::DetectionError;

/// Failure to reach a container runtime.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("SSH tunnel to {host} failed: {source}"))]
    Tunnel {
        host: String,
        source: crate::ssh::Error,
    },

    #[snafu(display("runtime connection failed: {message}"))]
    Connection { message: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// No container runtime found on the host.
    NoRuntimeFound,
    /// SSH session or socket forwarding failed.
    SshError,
    /// The runtime socket could not be reached.
    ConnectionFailed,
}

impl RuntimeError {
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::Detection { source } => match source {
                DetectionError::NoRuntimeFound | DetectionError::SocketMissing(_) => {
                    RuntimeErrorKind::NoRuntimeFound
                }
                DetectionError::Ssh(_) => RuntimeErrorKind::SshError,
            },
            RuntimeError::Tunnel { .. } => RuntimeErrorKind::SshError,
            RuntimeError::Connection { .. } => RuntimeErrorKind::ConnectionFailed,
        }
    }

    /// Returns connection error details if this is a connection failure.
    pub fn connection_details(&self) -> Option<&str> {
        match self {
            RuntimeError::Connection { message } => Some(message),
            _ => None,
        }
    }
}

impl From<DetectionError> for RuntimeError {
    fn from(source: DetectionError) -> Self {
        RuntimeError::Detection { source }
    }
}
