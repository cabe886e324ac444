// ABOUTME: Request types for image engine operations.
// ABOUTME: Plain data; the engine forwards filters and service options opaquely.

use crate::runtime::{ArchiveFormat, Filters};
use crate::types::ImageRef;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Include intermediate images.
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub filters: Filters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectOptions {
    /// Ask the service to compute image sizes.
    #[serde(default)]
    pub size: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Archive to load.
    pub input: PathBuf,
    /// Name to give the loaded image.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// A URL when `source_is_url`, a local tarball path otherwise.
    pub source: String,
    #[serde(default)]
    pub source_is_url: bool,
    /// Dockerfile-style instructions (`CMD ["sh"]`, `ENV A=b`).
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub message: String,
    /// `repo[:tag]` for the new image.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub source: ImageRef,
    /// A file for archive formats, a directory for directory formats.
    pub output: PathBuf,
    #[serde(default)]
    pub format: ArchiveFormat,
    #[serde(default)]
    pub compress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneOptions {
    /// Remove every unused image, not just dangling ones.
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub filters: Filters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    #[serde(default)]
    pub force: bool,
}
