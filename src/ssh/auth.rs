// ABOUTME: Host key verification and credential selection for SSH sessions.
// ABOUTME: known_hosts with optional trust-on-first-use; agent, key file or default keys.

use super::config::SessionConfig;
use super::error::{Error, Result};
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixStream;

const DEFAULT_KEYS: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// russh client handler that verifies the server key against known_hosts.
pub struct HostKeyCheck {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl HostKeyCheck {
    pub(super) fn new(config: &SessionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
        }
    }

    fn learn(&self, key: &ssh_key::PublicKey) {
        let learned = match &self.known_hosts_path {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!(host = %self.host, "failed to record host key: {}", e);
        }
    }
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(host = %self.host, "host key does not match known_hosts");
                Ok(false)
            }
            Ok(false) | Err(_) if self.trust_on_first_use => {
                tracing::warn!(host = %self.host, port = self.port, "accepting unknown host key");
                self.learn(server_public_key);
                Ok(true)
            }
            Ok(false) | Err(_) => Ok(false),
        }
    }
}

/// Where the session's identity comes from.
pub(super) enum Credential {
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

impl Credential {
    /// An explicit key wins; then the agent; then the default key files.
    pub(super) async fn resolve(config: &SessionConfig) -> Result<Self> {
        if let Some(path) = &config.key_path {
            return load_key(path).map(Credential::KeyFile);
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(Credential::Agent(agent));
        }

        let home = std::env::var("HOME")
            .map_err(|_| Error::NoCredentials("no SSH agent and HOME is not set".to_string()))?;
        let ssh_dir = PathBuf::from(home).join(".ssh");

        DEFAULT_KEYS
            .iter()
            .find_map(|name| load_key(&ssh_dir.join(name)).ok())
            .map(Credential::KeyFile)
            .ok_or_else(|| {
                Error::NoCredentials(format!(
                    "no SSH agent and no usable key in {}",
                    ssh_dir.display()
                ))
            })
    }

    /// Returns whether the server accepted one of our keys.
    pub(super) async fn authenticate(
        self,
        handle: &mut Handle<HostKeyCheck>,
        user: &str,
    ) -> Result<bool> {
        match self {
            Credential::Agent(mut agent) => {
                let identities = agent.request_identities().await.map_err(|e| {
                    Error::NoCredentials(format!("failed to list agent keys: {}", e))
                })?;

                for key in identities {
                    let accepted = handle
                        .authenticate_publickey_with(user, key, None, &mut agent)
                        .await;
                    if matches!(accepted, Ok(result) if result.success()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Credential::KeyFile(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;
                Ok(result.success())
            }
        }
    }
}

fn load_key(path: &std::path::Path) -> Result<Arc<ssh_key::PrivateKey>> {
    load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| Error::KeyLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
