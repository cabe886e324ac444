// ABOUTME: Chooses the engine backend at construction: local socket or SSH tunnel.
// ABOUTME: Either way the caller gets the same ImageEngine over a BollardTransport.

use super::ImageEngine;
use crate::config::Config;
use crate::runtime::{
    BollardTransport, RuntimeConfig, RuntimeError, TunnelSnafu, detect_local, detect_remote,
};
use crate::ssh::Session;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How the engine reaches the container service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// The daemon socket on this machine.
    #[default]
    Local,
    /// The daemon socket of a remote host, forwarded over SSH.
    Tunnel,
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineMode::Local => write!(f, "local"),
            EngineMode::Tunnel => write!(f, "tunnel"),
        }
    }
}

impl FromStr for EngineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(EngineMode::Local),
            "tunnel" | "remote" => Ok(EngineMode::Tunnel),
            other => Err(format!("unknown engine mode: {other}")),
        }
    }
}

/// Build an engine bound to the backend `config` selects.
pub async fn connect(config: Arc<Config>) -> Result<ImageEngine<BollardTransport>, RuntimeError> {
    let mode = config.engine.mode;
    let transport = match mode {
        EngineMode::Local => connect_local(&config)?,
        EngineMode::Tunnel => connect_tunnel(&config).await?,
    };

    if let Err(e) = transport.ping().await {
        let message = e.to_string();
        if let Err(close_err) = transport.close().await {
            tracing::warn!("failed to release transport: {}", close_err);
        }
        return Err(RuntimeError::Connection { message });
    }

    tracing::info!(
        %mode,
        runtime = %transport.runtime_type(),
        tunneled = transport.is_tunneled(),
        "image engine connected"
    );
    Ok(ImageEngine::new(transport, mode, config))
}

fn connect_local(config: &Config) -> Result<BollardTransport, RuntimeError> {
    let overrides = RuntimeConfig {
        runtime: config.engine.runtime,
        socket: config.engine.socket.clone(),
    };
    let info = detect_local(Some(&overrides))?;
    tracing::debug!(runtime = %info.runtime_type, socket = %info.socket_path, "using local runtime");
    BollardTransport::connect(&info)
}

async fn connect_tunnel(config: &Config) -> Result<BollardTransport, RuntimeError> {
    let remote = config
        .engine
        .remote
        .as_ref()
        .ok_or_else(|| RuntimeError::Connection {
            message: "tunnel mode needs engine.remote".to_string(),
        })?;

    let session_config = remote.session_config(config.engine.connect_timeout);
    let host = session_config.host.clone();
    let session = Session::connect(session_config)
        .await
        .context(TunnelSnafu { host })?;

    let info = match detect_remote(&session, Some(&remote.runtime_config())).await {
        Ok(info) => info,
        Err(e) => {
            if let Err(close_err) = session.disconnect().await {
                tracing::warn!(host = %remote.host, "failed to close SSH session: {}", close_err);
            }
            return Err(e.into());
        }
    };
    tracing::debug!(host = %remote.host, runtime = %info.runtime_type, socket = %info.socket_path, "using remote runtime");

    BollardTransport::connect_via_session(session, &info).await
}
