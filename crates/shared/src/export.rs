//! The durable world export artifact.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use worldloom_domain::{Entity, HistoryEvent, Relationship};

/// Run-level metadata for the export header.
///
/// `generated_at` is the wall-clock write time and the one field that is not
/// a function of the seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub tick: u64,
    pub epoch: u64,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub current_era: String,
    pub generated_at: DateTime<Utc>,
}

/// The complete exported world state.
///
/// This is the artifact every downstream tool consumes; the shape is
/// `{ metadata, hardState, relationships, pressures, history }` and must not
/// drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldExport {
    pub metadata: ExportMetadata,
    pub hard_state: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub pressures: BTreeMap<String, f64>,
    pub history: Vec<HistoryEvent>,
}

impl WorldExport {
    /// Serialize to the canonical pretty JSON form written to disk.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
