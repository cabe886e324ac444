// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Accepts the remote host as a short string or a detailed map.

use super::RemoteConfig;
use serde::Deserialize;

pub fn deserialize_remote<'de, D>(deserializer: D) -> Result<Option<RemoteConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entry: Option<RemoteEntry> = Option::deserialize(deserializer)?;
    entry
        .map(RemoteEntry::into_remote_config)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteEntry {
    Simple(String),
    Detailed(RemoteConfig),
}

impl RemoteEntry {
    fn into_remote_config(self) -> Result<RemoteConfig, String> {
        match self {
            RemoteEntry::Simple(s) => RemoteConfig::parse(&s),
            RemoteEntry::Detailed(c) => Ok(c),
        }
    }
}
