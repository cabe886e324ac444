// ABOUTME: Structural copy from wire records onto report types.
// ABOUTME: Fields match by name; unknown source fields drop, missing ones default.

use super::error::EngineError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Copy `wire` into a fresh `R`.
///
/// The wire value is serialized and read back as the report type, so every
/// nested record and list is duplicated. Report types carry
/// `#[serde(default)]`, which leaves fields the wire lacks at their zero value.
pub(crate) fn project<W, R>(what: &'static str, wire: &W) -> Result<R, EngineError>
where
    W: Serialize,
    R: DeserializeOwned,
{
    serde_json::to_value(wire)
        .and_then(serde_json::from_value)
        .map_err(|e| EngineError::Projection {
            what,
            reason: e.to_string(),
        })
}

/// Project every record, keeping order.
pub(crate) fn project_all<W, R>(what: &'static str, wires: &[W]) -> Result<Vec<R>, EngineError>
where
    W: Serialize,
    R: DeserializeOwned,
{
    wires.iter().map(|wire| project(what, wire)).collect()
}
