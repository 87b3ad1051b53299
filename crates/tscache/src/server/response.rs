//! Response rendering.
//!
//! Point lists become a JSON object keyed by formatted timestamp. Keys are
//! written in the order the points arrive, which is ascending for every
//! series and grid read, so the object preserves time order on the wire.

use crate::error::Result;
use crate::series::{FixedGridTimeseries, Timestamp};
use crate::tree::StructureDefinition;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Literal reply to `PING`.
pub const PONG: &str = "PONG";

/// Reply to a successful mutation.
pub const OK: &str = "OK";

/// Prefix of every error reply.
pub const ERR_PREFIX: &str = "ERR: ";

/// Ascending `(timestamp, value)` pairs serialized as a JSON object.
pub struct PointMap<'a, V>(pub &'a [(Timestamp, V)]);

impl<V: Serialize> Serialize for PointMap<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (timestamp, value) in self.0 {
            map.serialize_entry(&timestamp.format(), value)?;
        }
        map.end()
    }
}

/// Grid slots serialized as a JSON object keyed by slot timestamp.
pub struct GridMap<'a, V>(pub &'a FixedGridTimeseries<V>);

impl<V: Serialize> Serialize for GridMap<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (timestamp, value) in self.0.iter() {
            map.serialize_entry(&timestamp.format(), value)?;
        }
        map.end()
    }
}

#[derive(serde::Serialize)]
struct StructureEntry<'a> {
    name: &'a str,
    attributes: &'a [String],
}

/// Renders points as `{"<timestamp>":<value>,...}`.
pub fn points<V: Serialize>(points: &[(Timestamp, V)]) -> Result<String> {
    Ok(serde_json::to_string(&PointMap(points))?)
}

/// Renders every grid slot, null slots included.
pub fn grid<V: Serialize>(grid: &FixedGridTimeseries<V>) -> Result<String> {
    Ok(serde_json::to_string(&GridMap(grid))?)
}

/// Renders a list of names as a JSON array.
pub fn names(names: &[String]) -> Result<String> {
    Ok(serde_json::to_string(names)?)
}

/// Renders structure definitions as `[{"name":..,"attributes":[..]},...]`.
pub fn structures(definitions: &[StructureDefinition]) -> Result<String> {
    let entries: Vec<StructureEntry<'_>> = definitions
        .iter()
        .map(|definition| StructureEntry {
            name: definition.name(),
            attributes: definition.attributes(),
        })
        .collect();
    Ok(serde_json::to_string(&entries)?)
}

/// Renders an error reply line.
pub fn error(err: &impl std::fmt::Display) -> String {
    format!("{ERR_PREFIX}{err}")
}
