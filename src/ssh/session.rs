// ABOUTME: An authenticated SSH session to the runtime host.
// ABOUTME: Runs short probe commands and owns the socket forwarders it starts.

use super::auth::{Credential, HostKeyCheck};
use super::config::SessionConfig;
use super::error::{Error, Result};
use super::forward::Forwarder;
use parking_lot::Mutex;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;

/// Output from a remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Arc<Handle<HostKeyCheck>>,
    forwarders: Mutex<Vec<Forwarder>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("user", &self.config.user)
            .finish()
    }
}

impl Session {
    /// Connect and authenticate.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let credential = Credential::resolve(&config).await?;

        let russh_config = Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            keepalive_interval: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        let connecting = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            HostKeyCheck::new(&config),
        );

        let mut handle = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| Error::ConnectTimeout {
                host: config.host.clone(),
                port: config.port,
                timeout: config.connect_timeout,
            })?
            .map_err(|e| Error::Connection {
                host: config.host.clone(),
                port: config.port,
                reason: e.to_string(),
            })?;

        if !credential.authenticate(&mut handle, &config.user).await? {
            return Err(Error::AuthenticationFailed {
                user: config.user.clone(),
            });
        }

        tracing::debug!(host = %config.host, port = config.port, user = %config.user, "SSH session established");

        Ok(Self {
            config,
            handle: Arc::new(handle),
            forwarders: Mutex::new(Vec::new()),
        })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Check if a file or socket exists on the remote host.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let output = self.exec(&format!("test -e '{}'", path.replace('\'', ""))).await?;
        Ok(output.success())
    }

    /// Run a command, bounded by the configured command timeout.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let timeout = self.config.command_timeout;
        tokio::time::timeout(timeout, self.run(command))
            .await
            .map_err(|_| Error::CommandTimeout(timeout))?
    }

    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to start {command:?}: {e}")))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut eof = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        // No exit status means the channel died under the command.
        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Expose `remote_socket` as a local Unix socket; returns the local path.
    pub async fn forward_socket(&self, remote_socket: &str) -> Result<String> {
        let forwarder = Forwarder::start(Arc::clone(&self.handle), remote_socket)?;
        let path = forwarder
            .local_path()
            .to_str()
            .ok_or_else(|| Error::SocketForwardFailed("socket path is not valid UTF-8".to_string()))?
            .to_string();
        self.forwarders.lock().push(forwarder);
        Ok(path)
    }

    /// Stop every forwarder and close the connection.
    pub async fn disconnect(self) -> Result<()> {
        // Drain first so the lock is not held across the awaits below.
        let forwarders: Vec<_> = self.forwarders.lock().drain(..).collect();
        for forwarder in forwarders {
            forwarder.stop().await;
        }

        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        tracing::debug!(host = %self.config.host, "SSH session closed");
        Ok(())
    }
}
