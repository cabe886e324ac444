// ABOUTME: Forwards a private local Unix socket to a remote one over SSH.
// ABOUTME: Each accepted connection gets its own direct-streamlocal channel.

use super::auth::HostKeyCheck;
use super::error::{Error, Result};
use russh::client::Handle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

const LOCAL_SOCKET_NAME: &str = "runtime.sock";
const STOP_GRACE: Duration = Duration::from_secs(2);

/// A running socket forwarder.
///
/// The local socket lives in a private temporary directory that is removed
/// when the forwarder is stopped or dropped.
pub struct Forwarder {
    local_path: PathBuf,
    remote_path: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
    _dir: TempDir,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("local_path", &self.local_path)
            .field("remote_path", &self.remote_path)
            .finish()
    }
}

impl Forwarder {
    pub(super) fn start(handle: Arc<Handle<HostKeyCheck>>, remote_path: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("picha-")
            .tempdir()
            .map_err(|e| Error::SocketForwardFailed(format!("failed to create socket dir: {e}")))?;
        let local_path = dir.path().join(LOCAL_SOCKET_NAME);

        let listener = UnixListener::bind(&local_path).map_err(|e| {
            Error::SocketForwardFailed(format!(
                "failed to bind {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            handle,
            remote_path.to_string(),
            cancel.clone(),
        ));

        Ok(Self {
            local_path,
            remote_path: remote_path.to_string(),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            task,
            _dir: dir,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Stop accepting, give open connections a moment to wind down, remove the socket.
    pub async fn stop(self) {
        let Forwarder {
            cancel, task, _dir, ..
        } = self;
        cancel.cancel();
        if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
            tracing::debug!("socket forwarder did not stop in time");
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    handle: Arc<Handle<HostKeyCheck>>,
    remote_path: String,
    cancel: CancellationToken,
) {
    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!("forwarded socket stopped accepting: {}", e);
                    break;
                }
            },
        };

        let handle = Arc::clone(&handle);
        let remote_path = remote_path.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                piped = pipe(stream, &handle, &remote_path) => {
                    if let Err(e) = piped {
                        tracing::debug!(remote = %remote_path, "forwarded connection ended: {}", e);
                    }
                }
            }
        });
    }
}

/// Copy bytes both ways between a local client and the remote socket.
async fn pipe(
    mut local: UnixStream,
    handle: &Handle<HostKeyCheck>,
    remote_path: &str,
) -> Result<()> {
    let channel = handle
        .channel_open_direct_streamlocal(remote_path)
        .await
        .map_err(|e| {
            Error::SocketForwardFailed(format!("failed to open channel to {remote_path}: {e}"))
        })?;

    let mut remote = channel.into_stream();
    let (sent, received) = tokio::io::copy_bidirectional(&mut local, &mut remote).await?;
    tracing::trace!(sent, received, "forwarded connection closed");
    Ok(())
}
