// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, host key and forwarding failures.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection to {host}:{port} failed: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("connection to {host}:{port} timed out after {timeout:?}")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout: Duration,
    },

    #[error("authentication as {user} failed: no key was accepted")]
    AuthenticationFailed { user: String },

    #[error("no credentials available: {0}")]
    NoCredentials(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("remote command failed: {0}")]
    CommandFailed(String),

    #[error("remote command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("channel closed without an exit status")]
    ChannelClosed,

    #[error("socket forwarding failed: {0}")]
    SocketForwardFailed(String),

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
