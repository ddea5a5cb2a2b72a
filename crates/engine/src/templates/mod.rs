//! Growth templates: the structured-growth half of the engine.
//!
//! A template expands into a batch of proposed entities and relationships
//! without touching the graph; the commit step (see `commit`) applies the
//! batch under the duplicate, compatibility, cooldown, and budget gates.
//! Expansion is read-only so a failed or discarded expansion leaves no
//! partial state behind.

pub mod builtin;
pub mod commit;
pub mod declarative;

pub use commit::{commit_expansion, CommitOutcome};
pub use declarative::{CustomRegistry, DeclarativeTemplate};

use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::rngs::StdRng;

use worldloom_domain::{
    EntityId, EntityKind, Era, PartialEntity, ProposedRelationship, RelationshipId, Subtype,
    WorldConfig,
};

use crate::control::SaturationMonitor;
use crate::error::EngineError;
use crate::graph::WorldGraph;
use crate::ports::NameGeneratorPort;

/// Read-only view handed to templates during applicability checks, target
/// discovery, and expansion.
pub struct TemplateContext<'a> {
    pub graph: &'a WorldGraph,
    pub saturation: &'a SaturationMonitor,
    pub era: &'a Era,
    pub config: &'a WorldConfig,
    pub names: &'a dyn NameGeneratorPort,
}

/// The proposed batch a template produces. Relationships may reference
/// entities from this same batch through `EntityRef::Pending(index)`.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub entities: Vec<PartialEntity>,
    pub relationships: Vec<ProposedRelationship>,
    /// Existing edges this expansion supersedes (e.g. the old leadership edge
    /// in a succession). Archived before anything is created.
    pub archived_relationships: Vec<RelationshipId>,
    pub pressure_deltas: BTreeMap<String, f64>,
    /// Explicit era-transition triggers raised on commit.
    pub triggers: Vec<String>,
    /// Mechanical description of what happened, used for the narrative event
    /// until enrichment replaces it.
    pub description: String,
    /// Commit records a discovery (spacing + epoch cap accounting).
    pub marks_discovery: bool,
}

impl Expansion {
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_entity(mut self, entity: PartialEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_relationship(mut self, relationship: ProposedRelationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn archiving(mut self, relationship: RelationshipId) -> Self {
        self.archived_relationships.push(relationship);
        self
    }

    pub fn with_pressure_delta(mut self, pressure: impl Into<String>, delta: f64) -> Self {
        self.pressure_deltas.insert(pressure.into(), delta);
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    pub fn marking_discovery(mut self) -> Self {
        self.marks_discovery = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.relationships.is_empty()
            && self.archived_relationships.is_empty()
            && self.pressure_deltas.is_empty()
            && self.triggers.is_empty()
    }
}

/// What a selected template did with its chance to fire.
#[derive(Debug, Clone)]
pub enum TemplateOutcome {
    Expanded(Expansion),
    /// The template declined after selection; the reason lands in the run
    /// history.
    Skipped(String),
}

/// A structured-growth rule.
///
/// `can_apply` takes the RNG because pressure gates roll for their
/// extreme-range chance; everything else about applicability is
/// deterministic graph inspection.
#[async_trait]
pub trait GrowthTemplate: Send + Sync {
    fn id(&self) -> &str;

    /// The (kind, subtype) this template grows, for saturation accounting
    /// and feedback weighting. None for templates that only rewire.
    fn produces(&self) -> Option<(&EntityKind, &Subtype)> {
        None
    }

    fn can_apply(&self, ctx: &TemplateContext<'_>, rng: &mut StdRng) -> bool;

    /// Candidate target entities. Empty means targetless expansion (or a
    /// no-op for templates that require a target).
    fn find_targets(&self, ctx: &TemplateContext<'_>) -> Vec<EntityId>;

    /// Produce the proposed batch. Must not assume it will be committed.
    async fn expand(
        &self,
        ctx: &TemplateContext<'_>,
        target: Option<EntityId>,
        rng: &mut StdRng,
    ) -> Result<TemplateOutcome, EngineError>;
}
