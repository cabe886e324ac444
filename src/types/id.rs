// ABOUTME: Phantom-typed identifiers for image-level objects.
// ABOUTME: Keeps image IDs and layer IDs from being mixed up in reports.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub enum ImageMarker {}
pub enum LayerMarker {}

/// An identifier tagged with the kind of object it names.
///
/// Serializes as a bare string, so reports stay plain JSON.
#[must_use = "IDs reference images and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }

    /// The first 12 hex characters, with any `sha256:` prefix removed.
    pub fn short(&self) -> &str {
        let hex = self.value.strip_prefix("sha256:").unwrap_or(&self.value);
        let end = hex
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(hex.len());
        &hex[..end]
    }
}

// T is only a marker, so these are written by hand to avoid `T: Trait` bounds.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

pub type ImageId = Id<ImageMarker>;
pub type LayerId = Id<LayerMarker>;
