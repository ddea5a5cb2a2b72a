//! Relationship - a directed, typed edge in the world graph.

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, RelationshipId};
use crate::vocabulary::RelationshipKind;

/// Live vs. archived. Archived edges stay stored for narrative history but
/// are excluded from live adjacency queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    #[default]
    Active,
    Historical,
}

/// A directed, typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub kind: RelationshipKind,
    pub src: EntityId,
    pub dst: EntityId,
    /// Bond strength in [0, 1], when the kind carries one.
    #[serde(default)]
    pub strength: Option<f64>,
    /// Lineage/semantic distance in [0, 1].
    #[serde(default)]
    pub distance: Option<f64>,
    /// Entity whose action caused this edge to form.
    #[serde(default)]
    pub catalyzed_by: Option<EntityId>,
    #[serde(default)]
    pub category: Option<String>,
    pub created_at: u64,
    #[serde(default)]
    pub status: RelationshipStatus,
    #[serde(default)]
    pub archived_at: Option<u64>,
}

impl Relationship {
    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }

    /// Move to `historical` and stamp the archival tick. Idempotent.
    pub fn archive(&mut self, tick: u64) {
        if self.status == RelationshipStatus::Active {
            self.status = RelationshipStatus::Historical;
            self.archived_at = Some(tick);
        }
    }

    /// The other endpoint, if `id` is one of ours.
    pub fn other_endpoint(&self, id: EntityId) -> Option<EntityId> {
        if self.src == id {
            Some(self.dst)
        } else if self.dst == id {
            Some(self.src)
        } else {
            None
        }
    }

    pub fn touches(&self, id: EntityId) -> bool {
        self.src == id || self.dst == id
    }
}

/// A reference to an entity from inside a template expansion: either an
/// existing graph entity or the Nth entity created by the same expansion.
///
/// This is the typed replacement for stringly placeholder ids; the commit
/// step resolves `Pending` indices through an explicit map once real ids are
/// assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityRef {
    Existing(EntityId),
    Pending(usize),
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        Self::Existing(id)
    }
}

/// The template-output form of a relationship: endpoints may reference
/// entities that do not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedRelationship {
    pub kind: RelationshipKind,
    pub src: EntityRef,
    pub dst: EntityRef,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub catalyzed_by: Option<EntityRef>,
    #[serde(default)]
    pub category: Option<String>,
}

impl ProposedRelationship {
    pub fn new(kind: RelationshipKind, src: impl Into<EntityRef>, dst: impl Into<EntityRef>) -> Self {
        Self {
            kind,
            src: src.into(),
            dst: dst.into(),
            strength: None,
            distance: None,
            catalyzed_by: None,
            category: None,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength.clamp(0.0, 1.0));
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance.clamp(0.0, 1.0));
        self
    }

    pub fn catalyzed_by(mut self, by: impl Into<EntityRef>) -> Self {
        self.catalyzed_by = Some(by.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge() -> Relationship {
        Relationship {
            id: RelationshipId::from_seed(9, 1),
            kind: RelationshipKind::new("ally_of").unwrap(),
            src: EntityId::from_seed(9, 2),
            dst: EntityId::from_seed(9, 3),
            strength: Some(0.5),
            distance: None,
            catalyzed_by: None,
            category: Some("social".into()),
            created_at: 4,
            status: RelationshipStatus::Active,
            archived_at: None,
        }
    }

    #[test]
    fn archive_is_idempotent() {
        let mut rel = edge();
        rel.archive(10);
        rel.archive(20);
        assert_eq!(rel.status, RelationshipStatus::Historical);
        assert_eq!(rel.archived_at, Some(10));
    }

    #[test]
    fn other_endpoint_works_both_directions() {
        let rel = edge();
        assert_eq!(rel.other_endpoint(rel.src), Some(rel.dst));
        assert_eq!(rel.other_endpoint(rel.dst), Some(rel.src));
        assert_eq!(rel.other_endpoint(EntityId::from_seed(9, 99)), None);
    }

    #[test]
    fn proposed_strength_is_clamped() {
        let p = ProposedRelationship::new(
            RelationshipKind::new("ally_of").unwrap(),
            EntityRef::Pending(0),
            EntityId::from_seed(9, 2),
        )
        .with_strength(1.7);
        assert_eq!(p.strength, Some(1.0));
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let mut rel = edge();
        rel.archive(10);
        let json = serde_json::to_value(&rel).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("archivedAt").is_some());
        assert!(json.get("catalyzedBy").is_some());
        assert_eq!(json.get("status").and_then(|s| s.as_str()), Some("historical"));
    }
}
