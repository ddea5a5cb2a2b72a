//! Open-string vocabulary for the world domain.
//!
//! Entity kinds, subtypes, relationship kinds, cultures, and status labels
//! are data, not code: each domain registers its own vocabulary at
//! configuration load and every label is validated against it. The newtypes
//! below enforce label hygiene (non-empty, lowercase, no whitespace) at
//! construction; the `Vocabulary` registry enforces cross-references.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DomainError};

macro_rules! define_label {
    ($name:ident, $what:literal) => {
        /// A validated, normalized vocabulary label.
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl AsRef<str>) -> Result<Self, DomainError> {
                let normalized = raw.as_ref().trim().to_lowercase();
                if normalized.is_empty() {
                    return Err(DomainError::parse(concat!($what, " cannot be empty")));
                }
                if normalized.chars().any(char::is_whitespace) {
                    return Err(DomainError::parse(format!(
                        concat!($what, " cannot contain whitespace: {:?}"),
                        raw.as_ref()
                    )));
                }
                Ok(Self(normalized))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_label!(EntityKind, "entity kind");
define_label!(Subtype, "subtype");
define_label!(RelationshipKind, "relationship kind");
define_label!(Culture, "culture");
define_label!(StatusLabel, "status");

/// Registered entity kind: its known subtypes and terminal statuses.
///
/// A terminal status (e.g. `dead`, `historical`, `dissolved`) marks an entity
/// as retired; the graph archives its live relationships instead of deleting
/// the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKindDef {
    pub kind: EntityKind,
    #[serde(default)]
    pub subtypes: Vec<Subtype>,
    #[serde(default)]
    pub terminal_statuses: Vec<StatusLabel>,
}

/// Registered relationship kind with its endpoint rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipKindDef {
    pub kind: RelationshipKind,
    /// Entity kinds allowed on the source side.
    pub src_kinds: Vec<EntityKind>,
    /// Entity kinds allowed on the destination side.
    pub dst_kinds: Vec<EntityKind>,
    /// Bidirectional kinds treat (a, b) and (b, a) as the same edge for
    /// duplicate and adjacency checks.
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub category: Option<String>,
    /// Minimum ticks between two formations of this kind by one entity.
    #[serde(default = "default_cooldown")]
    pub cooldown_ticks: u64,
    /// Kinds that contradict this one between the same pair. The matrix is
    /// domain data, checked symmetrically (see `Vocabulary::are_compatible`).
    #[serde(default)]
    pub incompatible_with: Vec<RelationshipKind>,
}

fn default_cooldown() -> u64 {
    5
}

/// The validated vocabulary registry for one domain.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entity_kinds: BTreeMap<EntityKind, EntityKindDef>,
    relationship_kinds: BTreeMap<RelationshipKind, RelationshipKindDef>,
}

impl Vocabulary {
    /// Build a vocabulary from raw definitions, checking every
    /// cross-reference. Errors carry the offending field path.
    pub fn from_defs(
        entity_kinds: Vec<EntityKindDef>,
        relationship_kinds: Vec<RelationshipKindDef>,
    ) -> Result<Self, ConfigError> {
        let mut kinds = BTreeMap::new();
        for (i, def) in entity_kinds.into_iter().enumerate() {
            if kinds.insert(def.kind.clone(), def).is_some() {
                return Err(ConfigError::new(
                    format!("entityKinds[{i}].kind"),
                    "duplicate entity kind",
                ));
            }
        }

        let registered: BTreeSet<EntityKind> = kinds.keys().cloned().collect();
        let rel_names: BTreeSet<RelationshipKind> =
            relationship_kinds.iter().map(|d| d.kind.clone()).collect();

        let mut rels = BTreeMap::new();
        for (i, def) in relationship_kinds.into_iter().enumerate() {
            if def.src_kinds.is_empty() {
                return Err(ConfigError::new(
                    format!("relationshipKinds[{i}].srcKinds"),
                    "at least one source kind is required",
                ));
            }
            for (j, k) in def.src_kinds.iter().enumerate() {
                if !registered.contains(k) {
                    return Err(ConfigError::new(
                        format!("relationshipKinds[{i}].srcKinds[{j}]"),
                        format!("unknown entity kind {k:?}", k = k.as_str()),
                    ));
                }
            }
            if def.dst_kinds.is_empty() {
                return Err(ConfigError::new(
                    format!("relationshipKinds[{i}].dstKinds"),
                    "at least one destination kind is required",
                ));
            }
            for (j, k) in def.dst_kinds.iter().enumerate() {
                if !registered.contains(k) {
                    return Err(ConfigError::new(
                        format!("relationshipKinds[{i}].dstKinds[{j}]"),
                        format!("unknown entity kind {k:?}", k = k.as_str()),
                    ));
                }
            }
            for (j, other) in def.incompatible_with.iter().enumerate() {
                if !rel_names.contains(other) {
                    return Err(ConfigError::new(
                        format!("relationshipKinds[{i}].incompatibleWith[{j}]"),
                        format!("unknown relationship kind {k:?}", k = other.as_str()),
                    ));
                }
            }
            if rels.insert(def.kind.clone(), def).is_some() {
                return Err(ConfigError::new(
                    format!("relationshipKinds[{i}].kind"),
                    "duplicate relationship kind",
                ));
            }
        }

        Ok(Self {
            entity_kinds: kinds,
            relationship_kinds: rels,
        })
    }

    pub fn is_entity_kind(&self, kind: &EntityKind) -> bool {
        self.entity_kinds.contains_key(kind)
    }

    pub fn entity_kind(&self, kind: &EntityKind) -> Option<&EntityKindDef> {
        self.entity_kinds.get(kind)
    }

    pub fn entity_kinds(&self) -> impl Iterator<Item = &EntityKindDef> {
        self.entity_kinds.values()
    }

    pub fn relationship_kind(&self, kind: &RelationshipKind) -> Option<&RelationshipKindDef> {
        self.relationship_kinds.get(kind)
    }

    pub fn relationship_kinds(&self) -> impl Iterator<Item = &RelationshipKindDef> {
        self.relationship_kinds.values()
    }

    /// Whether `kind` accepts `src -> dst` endpoints of the given kinds.
    pub fn allows_endpoints(
        &self,
        kind: &RelationshipKind,
        src: &EntityKind,
        dst: &EntityKind,
    ) -> bool {
        match self.relationship_kinds.get(kind) {
            Some(def) => {
                let forward = def.src_kinds.contains(src) && def.dst_kinds.contains(dst);
                if def.bidirectional {
                    forward || (def.src_kinds.contains(dst) && def.dst_kinds.contains(src))
                } else {
                    forward
                }
            }
            None => false,
        }
    }

    pub fn is_bidirectional(&self, kind: &RelationshipKind) -> bool {
        self.relationship_kinds
            .get(kind)
            .is_some_and(|d| d.bidirectional)
    }

    pub fn cooldown_ticks(&self, kind: &RelationshipKind) -> u64 {
        self.relationship_kinds
            .get(kind)
            .map(|d| d.cooldown_ticks)
            .unwrap_or_else(default_cooldown)
    }

    /// Symmetric compatibility check: a proposed kind is incompatible with an
    /// existing kind between the same pair if either lists the other.
    pub fn are_compatible(&self, existing: &RelationshipKind, proposed: &RelationshipKind) -> bool {
        let listed = |a: &RelationshipKind, b: &RelationshipKind| {
            self.relationship_kinds
                .get(a)
                .is_some_and(|d| d.incompatible_with.contains(b))
        };
        !listed(existing, proposed) && !listed(proposed, existing)
    }

    /// Whether `status` retires an entity of `kind`.
    pub fn is_terminal_status(&self, kind: &EntityKind, status: &StatusLabel) -> bool {
        self.entity_kinds
            .get(kind)
            .is_some_and(|d| d.terminal_statuses.contains(status))
    }
}
