// ABOUTME: User-supplied image identifier: an ID, short name, or repo[:tag].
// ABOUTME: Kept as the raw string and parsed only when an operation needs parts.

use super::reference::{self, ParseReferenceError, ParsedRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An image as the user named it.
///
/// The daemon resolves IDs, short names and full references alike, so most
/// operations forward the raw string untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Parse into repository, tag and digest parts.
    pub fn parse(&self) -> Result<ParsedRef, ParseReferenceError> {
        reference::parse(&self.0)
    }

    /// Whether the input looks like a (possibly abbreviated) hex image ID.
    pub fn looks_like_id(&self) -> bool {
        let hex = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        hex.len() >= 12 && hex.len() <= 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ImageRef {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for ImageRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
