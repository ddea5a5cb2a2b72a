//! Entity - a node in the world graph (the "hard state").

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, EventId, RelationshipId};
use crate::vocabulary::{Culture, EntityKind, StatusLabel, Subtype};

/// How widely known an entity is, on an ordered scale.
///
/// Movement along the scale is single-step by convention (`raise`/`lower`);
/// direct assignment exists for config-driven seeding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Prominence {
    Forgotten,
    #[default]
    Marginal,
    Recognized,
    Renowned,
    Mythic,
}

impl Prominence {
    pub const ORDERED: [Prominence; 5] = [
        Prominence::Forgotten,
        Prominence::Marginal,
        Prominence::Recognized,
        Prominence::Renowned,
        Prominence::Mythic,
    ];

    /// One step up the scale, saturating at `Mythic`.
    pub fn raised(self) -> Self {
        let i = Self::ORDERED.iter().position(|p| *p == self).unwrap_or(0);
        Self::ORDERED[(i + 1).min(Self::ORDERED.len() - 1)]
    }

    /// One step down the scale, saturating at `Forgotten`.
    pub fn lowered(self) -> Self {
        let i = Self::ORDERED.iter().position(|p| *p == self).unwrap_or(0);
        Self::ORDERED[i.saturating_sub(1)]
    }
}

/// Agent capability: this entity can autonomously initiate events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Catalyst {
    /// Action domains the entity can act in (e.g. "politics", "war").
    #[serde(default)]
    pub domains: Vec<String>,
    /// Influence score weighting how often it catalyzes events.
    #[serde(default)]
    pub influence: f64,
    /// Events this entity has catalyzed.
    #[serde(default)]
    pub log: Vec<EventId>,
}

/// Tick window for historical entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalSpan {
    pub start_tick: u64,
    #[serde(default)]
    pub end_tick: Option<u64>,
}

/// Spatial placement, when the domain uses coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// A node in the world graph.
///
/// `links` is a denormalized cache of every relationship (live or archived)
/// touching this entity; the graph store keeps it consistent. Entities are
/// never hard-deleted in normal flows - a terminal status plus relationship
/// archival stands in for deletion so history stays reconstructable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub subtype: Subtype,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: StatusLabel,
    #[serde(default)]
    pub prominence: Prominence,
    #[serde(default)]
    pub culture: Option<Culture>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub links: Vec<RelationshipId>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyst: Option<Catalyst>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Entity {
    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_status(&self, status: &str) -> bool {
        self.status.as_str() == status
    }
}

/// The template-output form of an entity: everything but identity and links.
///
/// Templates reference partials by their index in the expansion
/// (`EntityRef::Pending`); the commit step assigns real ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialEntity {
    pub kind: EntityKind,
    pub subtype: Subtype,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: StatusLabel,
    #[serde(default)]
    pub prominence: Prominence,
    #[serde(default)]
    pub culture: Option<Culture>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub catalyst: Option<Catalyst>,
    #[serde(default)]
    pub temporal: Option<TemporalSpan>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl PartialEntity {
    pub fn new(kind: EntityKind, subtype: Subtype, name: impl Into<String>) -> Self {
        Self {
            kind,
            subtype,
            name: name.into(),
            description: String::new(),
            status: StatusLabel::new("alive").unwrap_or_else(|_| unreachable!()),
            prominence: Prominence::default(),
            culture: None,
            tags: BTreeSet::new(),
            catalyst: None,
            temporal: None,
            coordinates: None,
        }
    }

    pub fn with_status(mut self, status: StatusLabel) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_prominence(mut self, prominence: Prominence) -> Self {
        self.prominence = prominence;
        self
    }

    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = Some(culture);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_catalyst(mut self, catalyst: Catalyst) -> Self {
        self.catalyst = Some(catalyst);
        self
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Materialize with an assigned id at the given tick.
    pub fn into_entity(self, id: EntityId, tick: u64) -> Entity {
        Entity {
            id,
            kind: self.kind,
            subtype: self.subtype,
            name: self.name,
            description: self.description,
            status: self.status,
            prominence: self.prominence,
            culture: self.culture,
            tags: self.tags,
            links: Vec::new(),
            created_at: tick,
            updated_at: tick,
            catalyst: self.catalyst,
            temporal: self.temporal,
            coordinates: self.coordinates,
        }
    }
}

/// Merge-style update for an entity. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<StatusLabel>,
    #[serde(default)]
    pub prominence: Option<Prominence>,
    #[serde(default)]
    pub culture: Option<Culture>,
    #[serde(default)]
    pub add_tags: BTreeSet<String>,
    #[serde(default)]
    pub remove_tags: BTreeSet<String>,
    #[serde(default)]
    pub catalyst: Option<Catalyst>,
    #[serde(default)]
    pub temporal: Option<TemporalSpan>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl EntityPatch {
    pub fn status(status: StatusLabel) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn prominence(prominence: Prominence) -> Self {
        Self {
            prominence: Some(prominence),
            ..Self::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Apply to an entity in place, bumping `updated_at`.
    pub fn apply(self, entity: &mut Entity, tick: u64) {
        if let Some(name) = self.name {
            entity.name = name;
        }
        if let Some(description) = self.description {
            entity.description = description;
        }
        if let Some(status) = self.status {
            entity.status = status;
        }
        if let Some(prominence) = self.prominence {
            entity.prominence = prominence;
        }
        if let Some(culture) = self.culture {
            entity.culture = Some(culture);
        }
        for tag in self.add_tags {
            entity.tags.insert(tag);
        }
        for tag in &self.remove_tags {
            entity.tags.remove(tag);
        }
        if let Some(catalyst) = self.catalyst {
            entity.catalyst = Some(catalyst);
        }
        if let Some(temporal) = self.temporal {
            entity.temporal = Some(temporal);
        }
        if let Some(coordinates) = self.coordinates {
            entity.coordinates = Some(coordinates);
        }
        entity.updated_at = tick;
    }
}
