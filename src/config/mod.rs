// ABOUTME: Configuration types and parsing for picha.yml.
// ABOUTME: Handles YAML parsing, file discovery, defaults and env overrides.

mod deserialize;
mod server;

pub use server::RemoteConfig;

use crate::engine::EngineMode;
use crate::error::{Error, Result};
use crate::runtime::{ArchiveFormat, RuntimeType};
use deserialize::deserialize_remote;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "picha.yml";
pub const CONFIG_FILENAME_ALT: &str = "picha.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".picha/config.yml";

pub const ENV_ENGINE_MODE: &str = "PICHA_ENGINE_MODE";
pub const ENV_REMOTE: &str = "PICHA_REMOTE";
pub const ENV_SOCKET: &str = "PICHA_SOCKET";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub images: ImagesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: EngineMode,

    #[serde(default, deserialize_with = "deserialize_remote")]
    pub remote: Option<RemoteConfig>,

    /// Local runtime override; detected when absent.
    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub socket: Option<String>,

    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::default(),
            remote: None,
            runtime: None,
            socket: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(120)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Format used by `save` when none is given.
    #[serde(default)]
    pub save_format: ArchiveFormat,

    #[serde(default)]
    pub compress: bool,

    /// Where directory-format saves stage their archive; the system temp dir by default.
    #[serde(default)]
    pub tmp_dir: Option<PathBuf>,

    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            save_format: ArchiveFormat::default(),
            compress: false,
            tmp_dir: None,
            search_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> u32 {
    25
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// The configuration in effect: an explicit file, else one discovered in
    /// `dir`, else the defaults; then environment overrides.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Arc<Self>> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match Self::discover(dir) {
                Ok(config) => config,
                Err(Error::ConfigNotFound(_)) => Config::default(),
                Err(e) => return Err(e),
            },
        };

        config.apply_env()?;
        config.validate()?;
        Ok(Arc::new(config))
    }

    /// Apply `PICHA_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var(ENV_ENGINE_MODE) {
            self.engine.mode = mode
                .parse()
                .map_err(|e: String| Error::InvalidConfig(format!("{ENV_ENGINE_MODE}: {e}")))?;
        }

        if let Ok(remote) = std::env::var(ENV_REMOTE) {
            let parsed = RemoteConfig::parse(&remote)
                .map_err(|e| Error::InvalidConfig(format!("{ENV_REMOTE}: {e}")))?;
            // Keep file-level details (key, runtime) when only the address changes.
            self.engine.remote = Some(match self.engine.remote.take() {
                Some(existing) => RemoteConfig {
                    host: parsed.host,
                    port: parsed.port,
                    user: parsed.user.or(existing.user),
                    ..existing
                },
                None => parsed,
            });
        }

        if let Ok(socket) = std::env::var(ENV_SOCKET) {
            self.engine.socket = Some(socket);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.engine.mode == EngineMode::Tunnel && self.engine.remote.is_none() {
            return Err(Error::InvalidConfig(
                "engine.mode is tunnel but engine.remote is not set".to_string(),
            ));
        }
        if self.images.search_limit == 0 {
            return Err(Error::InvalidConfig(
                "images.search_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The runtime default configuration snapshot for the current directory.
pub fn defaults() -> Result<Arc<Config>> {
    let cwd = std::env::current_dir()?;
    Config::resolve(None, &cwd)
}
