// ABOUTME: Stable report types returned by the image engine.
// ABOUTME: Caller-owned, serializable, and free of wire or transport types.

use crate::types::{ImageId, LayerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One row of an image listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSummary {
    pub id: ImageId,
    pub parent_id: String,
    pub names: Vec<String>,
    pub digests: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub size: i64,
    pub shared_size: i64,
    pub virtual_size: i64,
    pub labels: HashMap<String, String>,
    pub containers_using: i64,
}

/// Full descriptor of one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInspect {
    pub id: ImageId,
    pub names: Vec<String>,
    pub digests: Vec<String>,
    pub parent: String,
    pub comment: String,
    pub created: Option<DateTime<Utc>>,
    pub author: String,
    pub architecture: String,
    pub variant: Option<String>,
    pub os: String,
    /// Present only when sizes were requested.
    pub size: Option<i64>,
    pub virtual_size: Option<i64>,
    pub config: Option<ImageConfig>,
    pub root_fs: Option<RootFs>,
}

impl ImageInspect {
    /// Layer digests from the root filesystem, bottom first.
    pub fn layers(&self) -> &[String] {
        self.root_fs
            .as_ref()
            .map(|fs| fs.layers.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub user: String,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub working_dir: String,
    pub labels: HashMap<String, String>,
    pub stop_signal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootFs {
    pub kind: String,
    pub layers: Vec<String>,
}

/// Results of inspecting several images at once.
///
/// `images` is aligned with the input: a failed lookup leaves `None` at its
/// position and records the failure under the input string in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectReport {
    pub images: Vec<Option<ImageInspect>>,
    pub errors: BTreeMap<String, String>,
}

impl InspectReport {
    /// The images that were found, in input order.
    pub fn found(&self) -> impl Iterator<Item = &ImageInspect> {
        self.images.iter().flatten()
    }
}

/// One layer of an image's history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageHistoryLayer {
    pub id: LayerId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub size: i64,
    pub comment: String,
    pub tags: Vec<String>,
}

/// History of an image, newest layer first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryReport {
    pub layers: Vec<ImageHistoryLayer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "C")]
    Modified,
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "D")]
    Deleted,
}

impl ChangeKind {
    /// Decode the numeric kind the service uses.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ChangeKind::Modified),
            1 => Some(ChangeKind::Added),
            2 => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffChange {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub changes: Vec<DiffChange>,
}

/// Images removed and names dropped by a delete, across all inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub deleted: Vec<ImageId>,
    pub untagged: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub pruned_ids: Vec<ImageId>,
    /// Bytes reclaimed; 0 when the service does not say.
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullReport {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub id: Option<ImageId>,
    pub names: Vec<String>,
}

/// One registry search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub name: String,
    pub description: String,
    pub stars: i64,
    pub official: bool,
    pub automated: bool,
}
