// ABOUTME: Wire records as the daemon returns them (Docker/libpod JSON).
// ABOUTME: Deserialize from daemon field names, serialize under canonical names.

//! Each record deserializes from the service's JSON (mostly PascalCase keys)
//! and serializes under its Rust field names. The engine's projector relies on
//! the serialized names lining up with the report types, so renaming a field
//! here is a contract change.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Treat an explicit JSON `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Keep a timestamp only when it arrives as text; some clients re-encode it.
fn text_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(Some(text)),
        _ => Ok(None),
    }
}

/// One row of `GET /images/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct ImageRecord {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: String,
    #[serde(default, rename(deserialize = "RepoTags"), deserialize_with = "nullable")]
    pub names: Vec<String>,
    #[serde(default, rename(deserialize = "RepoDigests"), deserialize_with = "nullable")]
    pub digests: Vec<String>,
    #[serde(default, rename(deserialize = "Created"))]
    pub created_at: i64,
    #[serde(default)]
    pub size: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub shared_size: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub virtual_size: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub labels: HashMap<String, String>,
    #[serde(default, rename(deserialize = "Containers"), deserialize_with = "nullable")]
    pub containers_using: i64,
}

/// `GET /images/{name}/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct ImageDetails {
    pub id: String,
    #[serde(default, rename(deserialize = "RepoTags"), deserialize_with = "nullable")]
    pub names: Vec<String>,
    #[serde(default, rename(deserialize = "RepoDigests"), deserialize_with = "nullable")]
    pub digests: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent: String,
    #[serde(default, deserialize_with = "nullable")]
    pub comment: String,
    #[serde(default, deserialize_with = "text_timestamp")]
    pub created: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub author: String,
    #[serde(default, deserialize_with = "nullable")]
    pub architecture: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub os: String,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub virtual_size: Option<i64>,
    #[serde(default)]
    pub config: Option<ImageConfigRecord>,
    #[serde(default, rename(deserialize = "RootFS"))]
    pub root_fs: Option<RootFsRecord>,
}

/// The runtime configuration baked into an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct ImageConfigRecord {
    #[serde(default, deserialize_with = "nullable")]
    pub user: String,
    #[serde(default, deserialize_with = "nullable")]
    pub env: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub cmd: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub entrypoint: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub working_dir: String,
    #[serde(default, deserialize_with = "nullable")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub stop_signal: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct RootFsRecord {
    #[serde(default, rename(deserialize = "Type"))]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub layers: Vec<String>,
}

/// One entry of `GET /images/{name}/history`, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct HistoryRecord {
    pub id: String,
    #[serde(default, rename(deserialize = "Created"))]
    pub created_at: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub created_by: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub comment: String,
}

/// One entry of `DELETE /images/{name}`: carries at most one of the two keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct DeleteRecord {
    #[serde(default)]
    pub deleted: Option<String>,
    #[serde(default)]
    pub untagged: Option<String>,
}

impl DeleteRecord {
    pub fn deleted(id: impl Into<String>) -> Self {
        Self {
            deleted: Some(id.into()),
            untagged: None,
        }
    }

    pub fn untagged(name: impl Into<String>) -> Self {
        Self {
            deleted: None,
            untagged: Some(name.into()),
        }
    }
}

/// `POST /images/prune`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct PruneRecord {
    #[serde(default, rename(deserialize = "ImagesDeleted"), deserialize_with = "nullable")]
    pub deleted: Vec<DeleteRecord>,
    #[serde(default, deserialize_with = "nullable")]
    pub space_reclaimed: i64,
}

impl PruneRecord {
    /// IDs of images actually removed, untag-only entries skipped.
    pub fn pruned_ids(&self) -> Vec<String> {
        self.deleted
            .iter()
            .filter_map(|record| record.deleted.clone())
            .collect()
    }
}

/// Images named by a load, pull or import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamesRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
}

/// One entry of libpod's `GET /images/{name}/changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "PascalCase"))]
pub struct ChangeRecord {
    pub path: String,
    /// 0 modified, 1 added, 2 deleted.
    pub kind: u8,
}

/// One row of `GET /images/search`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, rename(deserialize = "star_count"), deserialize_with = "nullable")]
    pub stars: i64,
    #[serde(default, rename(deserialize = "is_official"), deserialize_with = "nullable")]
    pub official: bool,
    #[serde(default, rename(deserialize = "is_automated"), deserialize_with = "nullable")]
    pub automated: bool,
}

/// A progress message from a streaming endpoint (pull, push, load, import).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressMessage {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

const LOADED_IMAGE: &str = "Loaded image: ";
const LOADED_IMAGE_ID: &str = "Loaded image ID: ";

impl ProgressMessage {
    /// The image named by a `Loaded image: ...` line, if this is one.
    pub fn loaded_name(&self) -> Option<&str> {
        let line = self.stream.as_deref()?.trim();
        line.strip_prefix(LOADED_IMAGE)
            .or_else(|| line.strip_prefix(LOADED_IMAGE_ID))
            .map(str::trim)
    }
}

/// Decode a stream of concatenated or newline-separated JSON progress messages.
pub fn decode_progress(body: &[u8]) -> Result<Vec<ProgressMessage>, serde_json::Error> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<ProgressMessage>()
        .collect()
}
