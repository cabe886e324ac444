// ABOUTME: The transport contract the image engine consumes.
// ABOUTME: Typed requests against a container service returning wire records.

use super::wire::{
    ChangeRecord, DeleteRecord, HistoryRecord, ImageDetails, ImageRecord, NamesRecord,
    PruneRecord, SearchRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Opaque filter map forwarded to the service (`label=...`, `dangling=true`, ...).
pub type Filters = HashMap<String, Vec<String>>;

/// An archive stream handed to the transport; dropped (closed) when the call ends.
pub type ArchiveReader = Box<dyn AsyncRead + Send + Unpin>;

/// Transport-level failures, surfaced unchanged by the engine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("{operation} is not supported by {runtime}")]
    Unsupported {
        operation: &'static str,
        runtime: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode service response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TransportError::NotFound(_) | TransportError::Api { status: 404, .. }
        )
    }
}

/// Archive layouts an image can be exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    #[default]
    OciArchive,
    DockerArchive,
    OciDir,
    DockerDir,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 4] = [
        ArchiveFormat::OciArchive,
        ArchiveFormat::DockerArchive,
        ArchiveFormat::OciDir,
        ArchiveFormat::DockerDir,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::OciArchive => "oci-archive",
            ArchiveFormat::DockerArchive => "docker-archive",
            ArchiveFormat::OciDir => "oci-dir",
            ArchiveFormat::DockerDir => "docker-dir",
        }
    }

    /// Directory formats are exported as a tar stream and unpacked locally.
    pub fn is_directory(&self) -> bool {
        matches!(self, ArchiveFormat::OciDir | ArchiveFormat::DockerDir)
    }

    pub fn is_oci(&self) -> bool {
        matches!(self, ArchiveFormat::OciArchive | ArchiveFormat::OciDir)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown format {s:?} (expected oci-archive, docker-archive, oci-dir or docker-dir)"
                )
            })
    }
}

/// Registry credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    /// Registry server (e.g. "ghcr.io").
    #[serde(default)]
    pub server: Option<String>,
}

/// Pull options, forwarded to the service as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOptions {
    /// Pull every tag of the repository.
    #[serde(default)]
    pub all_tags: bool,
    #[serde(default)]
    pub credentials: Option<RegistryAuth>,
    /// `Some(false)` allows plain-HTTP registries.
    #[serde(default)]
    pub tls_verify: Option<bool>,
    /// Suppress progress logging.
    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOptions {
    #[serde(default)]
    pub credentials: Option<RegistryAuth>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub filters: Filters,
}

/// Metadata for creating an image from a root filesystem tarball.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportParams {
    /// Dockerfile-style instructions applied to the new image (`CMD ["sh"]`).
    pub changes: Vec<String>,
    pub message: String,
    /// Repository of the new image; empty leaves it untagged.
    pub repo: String,
    pub tag: String,
}

/// Where the root filesystem of an import comes from.
pub enum ImportSource {
    /// The service downloads the tarball itself.
    Url(String),
    /// The tarball is streamed from the client.
    Archive(ArchiveReader),
}

impl fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ImportSource::Archive(_) => f.debug_tuple("Archive").field(&"<reader>").finish(),
        }
    }
}

/// Typed requests against a container service.
///
/// Implementations return wire records; normalizing them into reports is the
/// engine's job. One call is one logical request, and implementations must be
/// safe to share between concurrent callers.
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// `Ok(false)` when the image is absent; errors are for transport failures.
    async fn exists(&self, name_or_id: &str) -> Result<bool, TransportError>;

    async fn list(&self, all: bool, filters: &Filters) -> Result<Vec<ImageRecord>, TransportError>;

    async fn get_image(
        &self,
        name_or_id: &str,
        with_size: bool,
    ) -> Result<ImageDetails, TransportError>;

    async fn history(&self, name_or_id: &str) -> Result<Vec<HistoryRecord>, TransportError>;

    /// Returns the names of the pulled images.
    async fn pull(
        &self,
        reference: &str,
        options: &PullOptions,
    ) -> Result<Vec<String>, TransportError>;

    async fn push(
        &self,
        source: &str,
        destination: &str,
        options: &PushOptions,
    ) -> Result<(), TransportError>;

    async fn tag(&self, name_or_id: &str, tag: &str, repo: &str) -> Result<(), TransportError>;

    async fn untag(&self, name_or_id: &str, tag: &str, repo: &str) -> Result<(), TransportError>;

    async fn remove(
        &self,
        name_or_id: &str,
        force: bool,
    ) -> Result<Vec<DeleteRecord>, TransportError>;

    async fn prune(&self, all: bool, filters: &Filters) -> Result<PruneRecord, TransportError>;

    async fn load(
        &self,
        input: ArchiveReader,
        name: Option<&str>,
    ) -> Result<NamesRecord, TransportError>;

    async fn import(
        &self,
        params: &ImportParams,
        source: ImportSource,
    ) -> Result<NamesRecord, TransportError>;

    /// Stream the image archive into `output`. Does not close `output`.
    async fn export(
        &self,
        name_or_id: &str,
        output: &mut (dyn AsyncWrite + Send + Unpin),
        format: ArchiveFormat,
        compress: bool,
    ) -> Result<(), TransportError>;

    async fn diff(&self, name_or_id: &str) -> Result<Vec<ChangeRecord>, TransportError>;

    async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchRecord>, TransportError>;
}
